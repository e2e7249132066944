//! Name templates.
//!
//! Templates are parsed once into literal and token segments. Every alias a
//! user may type (`{w}`, `{write}`, `{write_node}` ...) resolves to one
//! [`TemplateToken`] at parse time; tokens a field does not admit, and
//! anything that is not a known alias, stay literal text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::gsv::GsvCombination;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_]+)\}").unwrap());

/// Canonical template tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateToken {
    /// Script file name without extension.
    ScriptStem,
    /// Script file name with extension.
    ScriptName,
    /// Rendered batch name.
    BatchName,
    /// Output node name.
    OutputName,
    /// Output file name, directory stripped.
    OutputFile,
    /// Output file name without frame placeholder or extension.
    OutputFileStem,
    RenderOrder,
    FrameRange,
    /// Active GSV combination, `key=value,...`.
    Gsv,
}

impl TemplateToken {
    const ALL: [TemplateToken; 9] = [
        TemplateToken::ScriptStem,
        TemplateToken::ScriptName,
        TemplateToken::BatchName,
        TemplateToken::OutputName,
        TemplateToken::OutputFile,
        TemplateToken::OutputFileStem,
        TemplateToken::RenderOrder,
        TemplateToken::FrameRange,
        TemplateToken::Gsv,
    ];

    /// Every spelling accepted for this token, without braces, lowercase.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            TemplateToken::ScriptStem => &["stem", "basestem", "base_stem"],
            TemplateToken::ScriptName => &[
                "s",
                "nk",
                "script",
                "scriptname",
                "script_name",
                "nukescript",
                "nuke_script",
            ],
            TemplateToken::BatchName => &["b", "bn", "batch", "batchname", "batch_name"],
            TemplateToken::OutputName => {
                &["w", "wn", "write", "writenode", "write_node", "write_name"]
            }
            TemplateToken::OutputFile => &["o", "fn", "file", "filename", "file_name", "output"],
            TemplateToken::OutputFileStem => &[
                "fs",
                "fns",
                "os",
                "fstem",
                "ostem",
                "filestem",
                "file_stem",
                "filenamestem",
                "filename_stem",
                "outputstem",
                "output_stem",
            ],
            TemplateToken::RenderOrder => &["r", "ro", "renderorder", "render_order"],
            TemplateToken::FrameRange => &["x", "f", "fr", "range", "framerange"],
            TemplateToken::Gsv => &[
                "g",
                "gsv",
                "gsvs",
                "graphscopevars",
                "graphscopevariables",
                "graph_scope_vars",
                "graph_scope_variables",
            ],
        }
    }

    /// Resolve an alias (case-insensitive, no braces).
    pub fn from_alias(alias: &str) -> Option<Self> {
        let alias = alias.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|token| token.aliases().contains(&alias.as_str()))
    }
}

/// The field a template renders into. Decides which tokens are honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    JobName,
    /// Only script-derived tokens; the batch name is rendered before any
    /// output is known.
    BatchName,
    Comment,
    ExtraInfo,
}

impl FieldKind {
    pub fn admits(&self, token: TemplateToken) -> bool {
        match self {
            FieldKind::BatchName => matches!(
                token,
                TemplateToken::ScriptStem | TemplateToken::ScriptName
            ),
            FieldKind::JobName | FieldKind::Comment | FieldKind::ExtraInfo => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(TemplateToken),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str, kind: FieldKind) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let token = TemplateToken::from_alias(&caps[1]).filter(|t| kind.admits(*t));
            let Some(token) = token else { continue };

            if whole.start() > last {
                segments.push(Segment::Literal(text[last..whole.start()].to_string()));
            }
            segments.push(Segment::Token(token));
            last = whole.end();
        }
        if last < text.len() {
            segments.push(Segment::Literal(text[last..].to_string()));
        }

        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn contains(&self, token: TemplateToken) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Token(token))
    }

    /// Render against `context`. Tokens without a value render empty.
    pub fn render(&self, context: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => out.push_str(&context.value(*token)),
            }
        }
        out
    }
}

/// Values available to templates. Unset fields render empty.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub script_stem: &'a str,
    pub script_name: &'a str,
    pub batch_name: Option<&'a str>,
    pub output_name: Option<&'a str>,
    /// Output path; only the file name part is rendered.
    pub output_path: Option<&'a str>,
    pub render_order: Option<i32>,
    pub frame_range: Option<&'a str>,
    pub gsv: Option<&'a GsvCombination>,
}

impl TemplateContext<'_> {
    fn value(&self, token: TemplateToken) -> String {
        match token {
            TemplateToken::ScriptStem => self.script_stem.to_string(),
            TemplateToken::ScriptName => self.script_name.to_string(),
            TemplateToken::BatchName => self.batch_name.unwrap_or_default().to_string(),
            TemplateToken::OutputName => self.output_name.unwrap_or_default().to_string(),
            TemplateToken::OutputFile => self
                .output_path
                .map(|p| file_name(p).to_string())
                .unwrap_or_default(),
            TemplateToken::OutputFileStem => self
                .output_path
                .map(|p| file_stem(file_name(p)))
                .unwrap_or_default(),
            TemplateToken::RenderOrder => self
                .render_order
                .map(|o| o.to_string())
                .unwrap_or_default(),
            TemplateToken::FrameRange => self.frame_range.unwrap_or_default().to_string(),
            TemplateToken::Gsv => self.gsv.map(|g| g.to_string()).unwrap_or_default(),
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// `comp.####.exr` and `comp.%04d.exr` both give `comp`; `comp.mov` gives
/// `comp`.
fn file_stem(name: &str) -> String {
    let without_ext = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    let is_frame_part = |part: &str| {
        !part.is_empty()
            && (part.chars().all(|c| c == '#')
                || (part.starts_with('%') && part.ends_with('d'))
                || part.chars().all(|c| c.is_ascii_digit()))
    };
    match without_ext.rfind(['.', '_']) {
        Some(sep) if is_frame_part(&without_ext[sep + 1..]) => without_ext[..sep].to_string(),
        _ => without_ext.to_string(),
    }
}
