use std::backtrace::Backtrace;
use std::sync::Arc;

const FRAME_SEPARATOR: &str = " --> ";

/// Settings for [`StackFormatter`].
///
/// Build one at startup (usually through [`Self::from_env`]) and hand it to
/// the formatter; it is never re-read afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StackFormatterConfig {
    /// Number of visible frames, counted from the panic site, to drop before
    /// rendering. The default of 1 elides the capture hook itself.
    pub skip: usize,
    /// Maximum number of frames rendered after skipping, 10 by default.
    /// Values below 2 are raised to 2.
    pub depth: usize,
    /// Path prefixes stripped from source locations to shorten log lines.
    pub trim_prefixes: Vec<String>,
    /// Frames whose symbol starts with any of these are omitted entirely.
    pub hidden_prefixes: Vec<String>,
}

impl Default for StackFormatterConfig {
    fn default() -> Self {
        Self {
            skip: 1,
            depth: 10,
            trim_prefixes: Vec::new(),
            hidden_prefixes: [
                "std::",
                "core::",
                "alloc::",
                "<std::",
                "<core::",
                "<alloc::",
                "__rust",
                "rust_begin_unwind",
                "rust_panic",
                "<unknown>",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl StackFormatterConfig {
    /// Returns the default settings with `CARGO_HOME` and `RUSTUP_HOME` (when
    /// set) registered as trim prefixes.
    ///
    /// The environment is read once, here.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for var in ["CARGO_HOME", "RUSTUP_HOME"] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    config.trim_prefixes.push(path);
                }
            }
        }
        config
    }

    /// Sets [`Self::skip`].
    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets [`Self::depth`].
    #[must_use]
    pub const fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Adds a path prefix to strip from source locations.
    #[must_use]
    pub fn with_trim_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trim_prefixes.push(prefix.into());
        self
    }
}

/// Renders a backtrace as a single log-friendly line.
///
/// Frames are listed outermost first and joined by ` --> `, each as
/// `symbol(file:line)`:
///
/// ```text
/// app::main(src/main.rs:10) --> app::run(src/lib.rs:42) --> app::step(src/lib.rs:7)
/// ```
///
/// Hidden frames are dropped first, then `skip` frames are removed from the
/// panic end, then at most `depth` frames are kept.
#[derive(Clone, Debug, Default)]
pub struct StackFormatter {
    config: Arc<StackFormatterConfig>,
}

#[derive(Debug, PartialEq, Eq)]
struct Frame<'a> {
    symbol: &'a str,
    location: Option<(&'a str, &'a str)>,
}

impl StackFormatter {
    pub fn new(config: StackFormatterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StackFormatterConfig {
        &self.config
    }

    /// Captures and renders the current call stack.
    pub fn capture(&self) -> String {
        self.format(&Backtrace::force_capture())
    }

    /// Renders an already captured backtrace.
    pub fn format(&self, backtrace: &Backtrace) -> String {
        self.format_rendered(&backtrace.to_string())
    }

    /// Renders the textual form produced by [`Backtrace`]'s `Display` impl.
    pub(crate) fn format_rendered(&self, rendered: &str) -> String {
        let depth = self.config.depth.max(2);
        let frames: Vec<Frame<'_>> = parse_frames(rendered)
            .into_iter()
            .filter(|frame| !self.is_hidden(frame.symbol))
            .skip(self.config.skip)
            .take(depth)
            .collect();

        let mut out = String::new();
        for frame in frames.iter().rev() {
            if !out.is_empty() {
                out.push_str(FRAME_SEPARATOR);
            }
            out.push_str(frame.symbol);
            if let Some((file, line)) = frame.location {
                out.push('(');
                out.push_str(self.trim_path(file));
                out.push(':');
                out.push_str(line);
                out.push(')');
            }
        }
        out
    }

    fn is_hidden(&self, symbol: &str) -> bool {
        self.config
            .hidden_prefixes
            .iter()
            .any(|prefix| symbol.starts_with(prefix.as_str()))
    }

    fn trim_path<'a>(&self, file: &'a str) -> &'a str {
        for prefix in &self.config.trim_prefixes {
            if let Some(rest) = file.strip_prefix(prefix.as_str()) {
                return rest.trim_start_matches(['/', '\\']);
            }
        }
        file
    }
}

/// Splits `Backtrace` display output into frames.
///
/// Each symbol line (`  3: name`, or an indented name for inlined symbols)
/// starts a frame; a following `at file:line:col` line attaches its location.
fn parse_frames(rendered: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                frame.location = split_location(location);
            }
            continue;
        }
        let symbol = match line.split_once(": ") {
            Some((index, name)) if index.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => line,
        };
        frames.push(Frame {
            symbol: symbol.trim(),
            location: None,
        });
    }
    frames
}

/// `path/to/file.rs:12:5` -> (`path/to/file.rs`, `12`).
fn split_location(location: &str) -> Option<(&str, &str)> {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next()?;
    let middle = parts.next()?;
    match parts.next() {
        Some(file) => Some((file, middle)),
        None => Some((middle, last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = "   0: slotkit::failure::boundary::capture_hook
             at /work/slotkit/src/failure/boundary.rs:30:17
   1: std::panicking::rust_panic_with_hook
             at /rustc/abc/library/std/src/panicking.rs:841:13
   2: app::jobs::resize
             at /work/app/src/jobs.rs:12:9
   3: app::jobs::run
             at /home/dev/.cargo/registry/src/app/jobs.rs:40:5
   4: core::ops::function::FnOnce::call_once
             at /rustc/abc/library/core/src/ops/function.rs:250:5
   5: app::main
             at /work/app/src/main.rs:3:5
";

    #[test]
    fn renders_outermost_first_without_hidden_frames() {
        let formatter = StackFormatter::default();
        assert_eq!(
            formatter.format_rendered(RENDERED),
            "app::main(/work/app/src/main.rs:3) --> \
             app::jobs::run(/home/dev/.cargo/registry/src/app/jobs.rs:40) --> \
             app::jobs::resize(/work/app/src/jobs.rs:12)"
        );
    }

    #[test]
    fn trims_configured_prefixes() {
        let formatter = StackFormatter::new(
            StackFormatterConfig::default()
                .with_trim_prefix("/home/dev/.cargo")
                .with_trim_prefix("/work/"),
        );
        assert_eq!(
            formatter.format_rendered(RENDERED),
            "app::main(app/src/main.rs:3) --> \
             app::jobs::run(registry/src/app/jobs.rs:40) --> \
             app::jobs::resize(app/src/jobs.rs:12)"
        );
    }

    #[test]
    fn applies_skip_then_depth() {
        let formatter =
            StackFormatter::new(StackFormatterConfig::default().with_skip(2).with_depth(1));
        // depth is raised to 2; skip drops the hook and `resize`.
        assert_eq!(
            formatter.format_rendered(RENDERED),
            "app::main(/work/app/src/main.rs:3) --> \
             app::jobs::run(/home/dev/.cargo/registry/src/app/jobs.rs:40)"
        );
    }

    #[test]
    fn default_depth_keeps_ten_frames() {
        let rendered: String = (0..15)
            .map(|i| format!("  {i}: app::frame_{i}\n             at src/lib.rs:{i}:1\n"))
            .collect();
        let line = StackFormatter::default().format_rendered(&rendered);
        assert_eq!(line.matches(FRAME_SEPARATOR).count(), 9);
        assert!(line.starts_with("app::frame_10(src/lib.rs:10)"), "{line}");
        assert!(line.ends_with("app::frame_1(src/lib.rs:1)"), "{line}");
    }

    #[test]
    fn keeps_frames_without_location() {
        let rendered =
            "   0: hook\n   1: app::work\n      app::inlined\n             at src/lib.rs:9:1\n";
        let formatter = StackFormatter::default();
        assert_eq!(
            formatter.format_rendered(rendered),
            "app::inlined(src/lib.rs:9) --> app::work"
        );
    }

    #[test]
    fn from_env_reads_cargo_home() {
        let config = StackFormatterConfig::from_env();
        if let Ok(home) = std::env::var("CARGO_HOME") {
            if !home.is_empty() {
                assert!(config.trim_prefixes.contains(&home));
            }
        }
        assert_eq!(config.skip, 1);
    }

    #[test]
    fn capture_produces_a_single_line() {
        let line = StackFormatter::default().capture();
        assert!(!line.contains('\n'));
    }
}
