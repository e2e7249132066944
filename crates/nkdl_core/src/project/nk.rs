//! Knob-level reader for `.nk` scripts.
//!
//! Only what submission needs is extracted: the script version, the `Root`
//! frame range, hero frames and scoped variables, `Group` nesting and
//! selection, and the knobs of every `Write` node. Everything else in the
//! script is skipped.
//!
//! ```text
//! version 16.0 v2
//! Root {
//!  first_frame 1001
//!  last_frame 1100
//!  gsv {
//!   __default__ {
//!    shot sh010
//!   }
//!   sh020 {
//!    shot sh020
//!   }
//!  }
//! }
//! Group {
//!  name Precomps
//!  selected true
//! }
//!  Write {
//!   file /out/bg.####.exr
//!   render_order 2
//!   name WriteBG
//!  }
//! end_group
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use super::model::{FormatVersion, ProjectError, ProjectModel, ProjectResult};
use super::node::{FrameLimit, OutputNode};
use super::script::{GsvDomain, ScriptProject};
use crate::frames::Frame;

const OUTPUT_CLASSES: &[&str] = &["Write"];
const CONTAINER_CLASSES: &[&str] = &["Group", "LiveGroup"];
const DEFAULT_GSV_SET: &str = "__default__";

/// One top-level statement of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Version(String),
    Node {
        class: String,
        knobs: BTreeMap<String, String>,
    },
    EndGroup,
}

/// Parse script text into a project. `path` becomes the project's script path.
pub fn parse_script(content: &str, path: &Path) -> ProjectResult<ScriptProject> {
    let statements = tokenize(content).map_err(|message| ProjectError::parse(path, message))?;

    let mut project = ScriptProject::new(path);
    let mut groups: Vec<String> = Vec::new();

    for statement in statements {
        match statement {
            Statement::Version(version) => {
                let number = version.split_whitespace().next().unwrap_or_default();
                match number.parse::<FormatVersion>() {
                    Ok(v) => project.version = Some(v),
                    Err(e) => tracing::warn!("Ignoring script version: {}", e),
                }
            }
            Statement::EndGroup => {
                if groups.pop().is_none() {
                    return Err(ProjectError::parse(path, "end_group without matching Group"));
                }
            }
            Statement::Node { class, knobs } => {
                if class == "Root" {
                    apply_root(&mut project, &knobs);
                    continue;
                }

                let name = knobs.get("name").cloned().unwrap_or_else(|| class.clone());
                let qualified = qualify(&groups, &name);

                if CONTAINER_CLASSES.contains(&class.as_str()) {
                    project
                        .containers
                        .insert(qualified.clone(), knob_bool(&knobs, "selected"));
                    groups.push(name);
                } else if OUTPUT_CLASSES.contains(&class.as_str()) {
                    let node = output_node(&class, qualified, &knobs, project.global_range());
                    project.nodes.push(node);
                }
            }
        }
    }

    if !groups.is_empty() {
        return Err(ProjectError::parse(
            path,
            format!("unterminated group '{}'", groups.join(".")),
        ));
    }

    Ok(project)
}

fn qualify(groups: &[String], name: &str) -> String {
    if groups.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", groups.join("."), name)
    }
}

fn apply_root(project: &mut ScriptProject, knobs: &BTreeMap<String, String>) {
    if let Some(first) = knob_frame(knobs, "first_frame") {
        project.first_frame = first;
    }
    if let Some(last) = knob_frame(knobs, "last_frame") {
        project.last_frame = last;
    }
    if let Some(hero) = knobs.get("heroFrames").filter(|h| !h.trim().is_empty()) {
        project.hero_frames = Some(hero.trim().to_string());
    }
    if let Some(gsv) = knobs.get("gsv") {
        project.gsv = read_gsv_sets(gsv);
    }
}

/// Variables from the root `gsv` knob, a list of `set { key value ... }`
/// blocks.
///
/// A key's options are the values it takes across every set, in order of
/// appearance. Its current value comes from the `__default__` set, falling
/// back to the first set that names it.
fn read_gsv_sets(knob: &str) -> BTreeMap<String, GsvDomain> {
    let mut domains: BTreeMap<String, GsvDomain> = BTreeMap::new();
    let items = brace_items(knob);

    for pair in items.chunks(2) {
        let [set, body] = pair else {
            tracing::warn!("Ignoring gsv set '{}' without values", pair[0]);
            continue;
        };
        let entries = brace_items(body);
        if entries.len() % 2 != 0 {
            tracing::warn!("Odd number of entries in gsv set '{}'", set);
        }
        for entry in entries.chunks_exact(2) {
            let (key, value) = (&entry[0], &entry[1]);
            let domain = domains.entry(key.clone()).or_default();
            if !domain.options.contains(value) {
                domain.options.push(value.clone());
            }
            if set == DEFAULT_GSV_SET || domain.value.is_none() {
                domain.value = Some(value.clone());
            }
        }
    }

    domains
}

/// Top-level words of a Tcl-style list. Braced items are returned without
/// their braces, quoted ones without their quotes.
fn brace_items(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut item = String::new();
        match c {
            '{' => {
                chars.next();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    item.push(c);
                }
                items.push(item.trim().to_string());
            }
            '"' => {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                item.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => item.push(c),
                    }
                }
                items.push(item);
            }
            _ => {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '{' {
                        break;
                    }
                    item.push(c);
                    chars.next();
                }
                items.push(item);
            }
        }
    }

    items
}

fn output_node(
    class: &str,
    name: String,
    knobs: &BTreeMap<String, String>,
    global: (Frame, Frame),
) -> OutputNode {
    let render_order = match knobs.get("render_order") {
        Some(value) => value.trim().parse::<i32>().unwrap_or_else(|_| {
            tracing::warn!("{}: non-numeric render_order '{}', using 0", name, value);
            0
        }),
        None => 0,
    };

    let frame_limit = knob_bool(knobs, "use_limit").then(|| FrameLimit {
        first: knob_frame(knobs, "first").unwrap_or(global.0),
        last: knob_frame(knobs, "last").unwrap_or(global.1),
    });

    OutputNode {
        name,
        class: class.to_string(),
        enabled: !knob_bool(knobs, "disable"),
        selected: knob_bool(knobs, "selected"),
        render_order,
        file: knobs.get("file").cloned().unwrap_or_default(),
        file_type: knobs.get("file_type").cloned(),
        frame_limit,
    }
}

fn knob_bool(knobs: &BTreeMap<String, String>, name: &str) -> bool {
    matches!(
        knobs.get(name).map(|v| v.trim()),
        Some("true") | Some("1")
    )
}

fn knob_frame(knobs: &BTreeMap<String, String>, name: &str) -> Option<Frame> {
    knobs.get(name).and_then(|v| v.trim().parse::<Frame>().ok())
}

/// Split script text into statements.
fn tokenize(content: &str) -> Result<Vec<Statement>, String> {
    let mut statements = Vec::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed == "end_group" {
            statements.push(Statement::EndGroup);
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("version ") {
            statements.push(Statement::Version(rest.trim().to_string()));
            continue;
        }
        if let Some(header) = trimmed.strip_suffix('{') {
            let class = header.trim();
            if is_identifier(class) {
                let knobs = read_node_body(&mut lines)
                    .map_err(|e| format!("line {}: {} in {} node", index + 1, e, class))?;
                statements.push(Statement::Node {
                    class: class.to_string(),
                    knobs,
                });
                continue;
            }
        }
        // push/set/clone bookkeeping lines carry nothing we need.
    }

    Ok(statements)
}

fn read_node_body<'a, I>(lines: &mut I) -> Result<BTreeMap<String, String>, String>
where
    I: Iterator<Item = (usize, &'a str)>,
{
    let mut knobs = BTreeMap::new();

    while let Some((_, line)) = lines.next() {
        let trimmed = line.trim();
        if trimmed == "}" {
            return Ok(knobs);
        }
        if trimmed.is_empty() {
            continue;
        }

        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (trimmed, ""),
        };

        let mut raw = rest.to_string();
        let mut depth = brace_depth(&raw);
        while depth > 0 {
            let Some((_, next)) = lines.next() else {
                return Err(format!("unbalanced braces in knob '{}'", name));
            };
            raw.push('\n');
            raw.push_str(next);
            depth += brace_depth(next);
        }

        knobs.insert(name.to_string(), unquote(&raw));
    }

    Err("unterminated block".to_string())
}

/// Net brace depth of a fragment, ignoring escaped braces and quoted text.
fn brace_depth(fragment: &str) -> i32 {
    let mut depth = 0;
    let mut chars = fragment.chars();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1].replace("\\\"", "\"");
    }
    if raw.len() >= 2 && raw.starts_with('{') && raw.ends_with('}') {
        return raw[1..raw.len() - 1].trim().to_string();
    }
    raw.to_string()
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#! /usr/local/Nuke15.1v3/libnuke-15.1.3.so -nx
version 15.1 v3
Root {
 inputs 0
 name /shots/sh010/comp_v003.nk
 first_frame 1001
 last_frame 1100
 heroFrames "1001 1050"
 format "2048 1556 0 0 2048 1556 1 2K_Super_35(full-ap)"
}
Read {
 inputs 0
 file /plates/sh010.####.exr
 name Read1
}
Write {
 file "/out/comp/sh010_comp.%04d.exr"
 file_type exr
 render_order 2
 name WriteComp
 selected true
}
Group {
 name Precomps
 selected true
 addUserKnob {20 User l "Pre comps"}
}
 Input {
  inputs 0
  name Input1
 }
 Write {
  file /out/bg/bg.####.exr
  use_limit true
  first 1010
  last 1020
  name WriteBG
 }
 Write {
  file /out/fg/fg.mov
  file_type mov
  disable true
  name WriteFG
 }
end_group
Write {
 file /out/slap.####.jpg
 render_order {{parent.order}}
 label {
   multi line
   label }
 name WriteSlap
}
"#;

    #[test]
    fn reads_root_and_outputs() {
        let project = parse_script(SCRIPT, Path::new("/shots/sh010/comp_v003.nk")).unwrap();

        assert_eq!(project.format_version(), Some(FormatVersion::new(15, 1)));
        assert_eq!(project.global_range(), (1001, 1100));
        assert_eq!(project.hero_frames().as_deref(), Some("1001 1050"));

        let names: Vec<_> = project.output_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(
            names,
            vec!["WriteComp", "Precomps.WriteBG", "Precomps.WriteFG", "WriteSlap"]
        );
    }

    #[test]
    fn reads_write_knobs() {
        let project = parse_script(SCRIPT, Path::new("/tmp/a.nk")).unwrap();
        let nodes = project.output_nodes();

        assert_eq!(nodes[0].file, "/out/comp/sh010_comp.%04d.exr");
        assert_eq!(nodes[0].render_order, 2);
        assert!(nodes[0].selected);

        assert_eq!(nodes[1].frame_limit, Some(FrameLimit { first: 1010, last: 1020 }));
        assert!(nodes[1].enabled);

        assert!(!nodes[2].enabled);
        assert!(nodes[2].is_movie());

        // Expression-driven render order falls back to 0.
        assert_eq!(nodes[3].render_order, 0);
    }

    #[test]
    fn records_container_selection() {
        let project = parse_script(SCRIPT, Path::new("/tmp/a.nk")).unwrap();
        assert!(project.container_selected("Precomps"));
        assert!(!project.container_selected("Other"));
    }

    #[test]
    fn unbalanced_groups_fail() {
        let script = "Group {\n name G\n}\nWrite {\n name W\n}\n";
        assert!(parse_script(script, Path::new("/tmp/a.nk")).is_err());

        let script = "end_group\n";
        assert!(parse_script(script, Path::new("/tmp/a.nk")).is_err());
    }

    #[test]
    fn unterminated_node_fails() {
        let script = "Write {\n name W\n";
        assert!(parse_script(script, Path::new("/tmp/a.nk")).is_err());
    }

    const GSV_SCRIPT: &str = r#"version 16.0 v2
Root {
 inputs 0
 first_frame 1001
 last_frame 1010
 gsv {
  __default__ {
   shot sh020
   res "2k"
  }
  sh010 {
   shot sh010
   res 4k
  }
  sh020 {
   shot sh020
  }
 }
}
Write {
 file /out/%{shot}/%{res}/comp.####.exr
 name Write1
}
"#;

    #[test]
    fn reads_gsv_sets_from_root() {
        let project = parse_script(GSV_SCRIPT, Path::new("/tmp/gsv.nk")).unwrap();

        assert_eq!(project.format_version(), Some(FormatVersion::new(16, 0)));
        assert_eq!(project.gsv_options("shot"), vec!["sh020", "sh010"]);
        assert_eq!(project.gsv_options("res"), vec!["2k", "4k"]);
        assert_eq!(project.gsv_value("shot").as_deref(), Some("sh020"));
        assert_eq!(project.gsv_value("res").as_deref(), Some("2k"));
        assert_eq!(
            project.evaluated_output_path("Write1").as_deref(),
            Some("/out/sh020/2k/comp.####.exr")
        );
    }

    #[test]
    fn gsv_sets_from_script_drive_resolution() {
        use crate::gsv::{GsvRequest, ScopedVariableResolver};

        let project = parse_script(GSV_SCRIPT, Path::new("/tmp/gsv.nk")).unwrap();
        let resolver = ScopedVariableResolver::new(&project, FormatVersion::new(16, 0));
        let request = GsvRequest::Flat(vec!["shot".to_string()]);
        let combos = resolver.resolve(Some(&request), true).unwrap();
        assert_eq!(combos.len(), 2);
    }

    #[test]
    fn brace_items_split_top_level_words() {
        assert_eq!(
            brace_items("a {b {c d}} \"e f\" g"),
            vec!["a", "b {c d}", "e f", "g"]
        );
        assert!(brace_items("   ").is_empty());
    }

    #[test]
    fn unquote_handles_quotes_and_braces() {
        assert_eq!(unquote("\"a \\\"b\\\"\""), "a \"b\"");
        assert_eq!(unquote("{ x y }"), "x y");
        assert_eq!(unquote("plain"), "plain");
    }
}
