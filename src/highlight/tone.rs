/// Accent colors cycled through by highlighted cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Azure,
    Violet,
    Coral,
    Amber,
    Mint,
}

impl Tone {
    pub const ALL: [Tone; 5] = [
        Self::Azure,
        Self::Violet,
        Self::Coral,
        Self::Amber,
        Self::Mint,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::Violet => "violet",
            Self::Coral => "coral",
            Self::Amber => "amber",
            Self::Mint => "mint",
        }
    }

    /// Linear RGB, 0..1.
    pub fn rgb(self) -> [f32; 3] {
        match self {
            Self::Azure => [0.22, 0.56, 0.98],
            Self::Violet => [0.58, 0.36, 0.95],
            Self::Coral => [0.98, 0.42, 0.36],
            Self::Amber => [0.98, 0.72, 0.22],
            Self::Mint => [0.26, 0.86, 0.62],
        }
    }

    /// Parse a palette entry by label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for tone in Tone::ALL {
            assert_eq!(Tone::from_label(tone.label()), Some(tone));
        }
        assert_eq!(Tone::from_label(" CORAL "), Some(Tone::Coral));
        assert_eq!(Tone::from_label("teal"), None);
    }
}
