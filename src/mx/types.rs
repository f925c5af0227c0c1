#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MxCandidate {
    pub exchange: String,
    /// Lower wins.
    pub priority: u16,
}

impl MxCandidate {
    pub fn new(priority: u16, exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            priority,
        }
    }
}
