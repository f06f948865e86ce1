/// Proof mode (§GLOSSARY): governs whether and how the engine asks nodes to
/// return cryptographic proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProofMode {
    None,
    #[default]
    Standard,
    Full,
}

impl ProofMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofMode::None => "none",
            ProofMode::Standard => "standard",
            ProofMode::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ProofMode::None),
            "standard" => Some(ProofMode::Standard),
            "full" => Some(ProofMode::Full),
            _ => None,
        }
    }
}
