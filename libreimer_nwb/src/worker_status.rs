/// Progress message sent from the conversion thread to whoever is watching
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStatus {
    /// Fraction of the current session done, 0.0 to 1.0
    pub progress: f32,
    pub session_number: usize,
    pub total_sessions: usize,
    /// The session being converted
    pub label: String,
}

impl WorkerStatus {
    pub fn new(progress: f32, session_number: usize, total_sessions: usize, label: &str) -> Self {
        Self {
            progress,
            session_number,
            total_sessions,
            label: label.to_string(),
        }
    }
}
