/// Aggregated view of session progress, useful for a front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub answered: u32,
    pub correct: u32,
    /// Session length, when one applies.
    pub target: Option<u32>,
    pub remaining: Option<u32>,
    pub is_complete: bool,
}
