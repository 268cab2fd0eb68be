use pehdr::PeHeader;
use serde::{Deserialize, Serialize};

/// A detected image header and the virtual address it starts at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extract {
    pub va: u64,
    #[serde(flatten)]
    pub header: PeHeader,
}
