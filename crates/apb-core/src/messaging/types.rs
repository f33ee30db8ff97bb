/// Outgoing "chat action" shown while a batch runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Progress messages can be edited in place. Without it the batch only
    /// sends the first progress line and the final report.
    pub supports_edit: bool,
}
