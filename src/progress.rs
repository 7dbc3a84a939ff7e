/// Typed progress events emitted by the pipeline phases.
///
/// Library code never prints; it hands events to a caller-supplied closure
/// and the CLI decides how to render them.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A single line of progress; `persist=true` means the message should be
    /// printed as a permanent line (newline), otherwise it's transient (spinner line).
    Line { text: String, persist: bool },
    /// One unit of work done out of a known total
    Step {
        label: String,
        current: usize,
        total: usize,
    },
}

impl ProgressEvent {
    pub fn transient(text: impl Into<String>) -> Self {
        ProgressEvent::Line {
            text: text.into(),
            persist: false,
        }
    }

    pub fn persist(text: impl Into<String>) -> Self {
        ProgressEvent::Line {
            text: text.into(),
            persist: true,
        }
    }

    pub fn step(label: impl Into<String>, current: usize, total: usize) -> Self {
        ProgressEvent::Step {
            label: label.into(),
            current,
            total,
        }
    }
}
