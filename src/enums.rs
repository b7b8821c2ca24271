use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

/// Volume types recognized by BIDS for `*_aslcontext.tsv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BidsLabel {
    Cbf,
    Control,
    Deltam,
    Label,
    M0scan,
}

/// Labels that are accepted in an `aslContext` but are not BIDS volume types.
/// Volumes carrying one of these are removed from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtraLabel {
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaggedLabel {
    Bids(BidsLabel),
    Extra(ExtraLabel),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown aslcontext label [{0}]")]
pub struct UnknownLabel(pub String);

impl BidsLabel {
    pub const ALL: [BidsLabel; 5] = [
        BidsLabel::Cbf,
        BidsLabel::Control,
        BidsLabel::Deltam,
        BidsLabel::Label,
        BidsLabel::M0scan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BidsLabel::Cbf => "cbf",
            BidsLabel::Control => "control",
            BidsLabel::Deltam => "deltam",
            BidsLabel::Label => "label",
            BidsLabel::M0scan => "m0scan",
        }
    }
}

impl ExtraLabel {
    pub const ALL: [ExtraLabel; 1] = [ExtraLabel::Discard];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtraLabel::Discard => "discard",
        }
    }
}

impl TaggedLabel {
    /// `true` for labels that end up in the sidecar, `false` for volumes that
    /// are to be discarded.
    pub fn is_bids(&self) -> bool {
        matches!(self, TaggedLabel::Bids(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaggedLabel::Bids(label) => label.as_str(),
            TaggedLabel::Extra(label) => label.as_str(),
        }
    }
}

impl FromStr for TaggedLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bids = BidsLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .map(TaggedLabel::Bids);
        let extra = || {
            ExtraLabel::ALL
                .into_iter()
                .find(|label| label.as_str() == s)
                .map(TaggedLabel::Extra)
        };
        bids.or_else(extra).ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

impl fmt::Display for TaggedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_bids_label_as_bids() {
        for raw in ["cbf", "control", "deltam", "label", "m0scan"] {
            let tagged: TaggedLabel = raw.parse().unwrap();
            assert!(tagged.is_bids(), "{raw} should be a BIDS label");
            assert_eq!(tagged.as_str(), raw);
        }
    }

    #[test]
    fn classifies_discard_as_extra() {
        let tagged: TaggedLabel = "discard".parse().unwrap();
        assert_eq!(tagged, TaggedLabel::Extra(ExtraLabel::Discard));
        assert!(!tagged.is_bids());
    }

    #[test]
    fn rejects_unknown_labels() {
        assert_eq!(
            "bolus".parse::<TaggedLabel>(),
            Err(UnknownLabel("bolus".to_string()))
        );
        // matching is case-sensitive
        assert!("Control".parse::<TaggedLabel>().is_err());
        assert!("".parse::<TaggedLabel>().is_err());
    }

    #[test]
    fn bids_label_serializes_lowercase() {
        let json = serde_json::to_string(&BidsLabel::M0scan).unwrap();
        assert_eq!(json, "\"m0scan\"");
    }
}
