//! Render-plugin record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::job_info::bool_text;
use crate::frames::Frame;
use crate::gsv::GsvCombination;
use crate::models::RenderMode;

/// One output rendered as its own task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub name: String,
    pub first: Frame,
    pub last: Frame,
}

/// Which outputs the plugin renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSelection {
    /// Every enabled output in the script.
    #[default]
    All,
    /// The named outputs, all in the same task.
    Named(Vec<String>),
    /// One task per output. Frame bounds are only sent when
    /// `use_node_frame_list` is set; otherwise the farm is told 0-0.
    Tasks {
        outputs: Vec<TaskOutput>,
        use_node_frame_list: bool,
    },
}

/// Plugin-level fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub scene_file: String,
    /// `MAJOR.MINOR` of the render application.
    pub version: String,
    pub nukex: bool,
    pub batch_mode: bool,
    /// 0 lets the renderer decide.
    pub threads: u32,
    /// Megabytes, 0 means unlimited.
    pub ram_use_mb: u32,
    pub use_gpu: bool,
    pub gpu_override: Option<u32>,
    pub render_mode: RenderMode,
    pub enforce_render_order: bool,
    pub continue_on_error: bool,
    pub reload_plugins: bool,
    pub performance_profiler: bool,
    pub performance_profiler_dir: Option<String>,
    /// Megabytes, 0 keeps the renderer default.
    pub stack_size: u32,
    pub views: Vec<String>,
    pub outputs: OutputSelection,
    pub gsv: Option<GsvCombination>,
    pub extra: BTreeMap<String, String>,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            scene_file: String::new(),
            version: String::new(),
            nukex: false,
            batch_mode: true,
            threads: 0,
            ram_use_mb: 0,
            use_gpu: false,
            gpu_override: None,
            render_mode: RenderMode::Full,
            enforce_render_order: true,
            continue_on_error: false,
            reload_plugins: false,
            performance_profiler: false,
            performance_profiler_dir: None,
            stack_size: 0,
            views: Vec::new(),
            outputs: OutputSelection::All,
            gsv: None,
            extra: BTreeMap::new(),
        }
    }
}

impl PluginInfo {
    /// Flatten into the plugin's `Key=Value` record.
    pub fn to_records(&self) -> BTreeMap<String, String> {
        let mut records = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            records.insert(key.to_string(), value);
        };

        put("SceneFile", self.scene_file.clone());
        put("Version", self.version.clone());
        put("NukeX", bool_text(self.nukex));
        put("BatchMode", bool_text(self.batch_mode));
        put("Threads", self.threads.to_string());
        put("RamUse", self.ram_use_mb.to_string());
        put("UseGpu", bool_text(self.use_gpu));
        put("RenderMode", self.render_mode.to_string());
        put("EnforceRenderOrder", bool_text(self.enforce_render_order));
        put("ContinueOnError", bool_text(self.continue_on_error));
        put("ReloadPlugins", bool_text(self.reload_plugins));
        put("PerformanceProfiler", bool_text(self.performance_profiler));

        if let Some(gpu) = self.gpu_override {
            put("GpuOverride", gpu.to_string());
        }
        if self.performance_profiler {
            if let Some(dir) = &self.performance_profiler_dir {
                put("PerformanceProfilerDir", dir.clone());
            }
        }
        if self.stack_size > 0 {
            put("StackSize", self.stack_size.to_string());
        }
        if !self.views.is_empty() {
            put("Views", self.views.join(","));
        }

        match &self.outputs {
            OutputSelection::All => {}
            OutputSelection::Named(names) => put("WriteNode", names.join(",")),
            OutputSelection::Tasks {
                outputs,
                use_node_frame_list,
            } => {
                put("WriteNodesAsSeparateJobs", bool_text(true));
                for (index, output) in outputs.iter().enumerate() {
                    put(&format!("WriteNode{}", index), output.name.clone());
                    let (first, last) = if *use_node_frame_list {
                        (output.first, output.last)
                    } else {
                        (0, 0)
                    };
                    put(&format!("WriteNode{}StartFrame", index), first.to_string());
                    put(&format!("WriteNode{}EndFrame", index), last.to_string());
                }
                if *use_node_frame_list {
                    put("UseNodeFrameList", bool_text(true));
                }
            }
        }

        if let Some(gsv) = self.gsv.as_ref().filter(|g| !g.is_empty()) {
            put("GraphScopeVariablesEnabled", bool_text(true));
            put("GraphScopeVariables", gsv.to_string());
        }

        for (key, value) in &self.extra {
            put(key, value.clone());
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_outputs() {
        let info = PluginInfo {
            scene_file: "/shots/comp.nk".to_string(),
            version: "15.1".to_string(),
            outputs: OutputSelection::Named(vec!["WriteA".to_string(), "WriteB".to_string()]),
            ..Default::default()
        };
        let records = info.to_records();
        assert_eq!(records["SceneFile"], "/shots/comp.nk");
        assert_eq!(records["Version"], "15.1");
        assert_eq!(records["WriteNode"], "WriteA,WriteB");
        assert!(!records.contains_key("GraphScopeVariables"));
    }

    #[test]
    fn task_outputs_zeroed_without_node_frames() {
        let outputs = vec![
            TaskOutput {
                name: "WriteA".to_string(),
                first: 1001,
                last: 1010,
            },
            TaskOutput {
                name: "WriteB".to_string(),
                first: 1005,
                last: 1020,
            },
        ];

        let zeroed = PluginInfo {
            outputs: OutputSelection::Tasks {
                outputs: outputs.clone(),
                use_node_frame_list: false,
            },
            ..Default::default()
        }
        .to_records();
        assert_eq!(zeroed["WriteNode1"], "WriteB");
        assert_eq!(zeroed["WriteNode1StartFrame"], "0");
        assert_eq!(zeroed["WriteNode1EndFrame"], "0");
        assert!(!zeroed.contains_key("UseNodeFrameList"));

        let framed = PluginInfo {
            outputs: OutputSelection::Tasks {
                outputs,
                use_node_frame_list: true,
            },
            ..Default::default()
        }
        .to_records();
        assert_eq!(framed["WriteNode1StartFrame"], "1005");
        assert_eq!(framed["WriteNode1EndFrame"], "1020");
        assert_eq!(framed["UseNodeFrameList"], "True");
    }

    #[test]
    fn gsv_fields() {
        let info = PluginInfo {
            gsv: Some(GsvCombination::new(vec![
                ("shot".to_string(), "A".to_string()),
                ("res".to_string(), "hi".to_string()),
            ])),
            ..Default::default()
        };
        let records = info.to_records();
        assert_eq!(records["GraphScopeVariablesEnabled"], "True");
        assert_eq!(records["GraphScopeVariables"], "shot=A,res=hi");
    }
}
