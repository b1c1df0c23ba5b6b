use std::fmt;

/// Where the traced program is, as far as the client knows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    /// No program, or the channel to it is gone
    #[default]
    Dead,
    /// Run has been sent but the program has not confirmed it
    Started,
    Running,
    /// Halted in the server's command loop
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Dead => f.write_str("dead"),
            Status::Started => f.write_str("started"),
            Status::Running => f.write_str("running"),
            Status::Stopped => f.write_str("stopped"),
        }
    }
}
