use crate::validation::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype {
    ($name:ident, $doc:expr, $pattern:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new instance without validation; callers are responsible for conformity.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses a validated identifier from a string.
            pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
                let s = value.into();
                if !Regex::new($pattern).expect("invalid regex").is_match(&s) {
                    return Err(ValidationError::PatternMismatch {
                        field: stringify!($name),
                        value: s,
                    });
                }
                Ok(Self(s))
            }

            /// Borrows the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    Epc,
    "Electronic Product Code. Opaque; two EPCs match only when their strings are equal.",
    r"^\S{1,512}$"
);
newtype!(
    EventId,
    "Stable identifier of a stored event (content digest or imported id).",
    r"^[A-Za-z0-9_.:-]{1,128}$"
);
newtype!(
    EntityType,
    "Kind of record an audit block describes (`event`, `product`, ...).",
    r"^[a-z][a-z0-9_]{0,63}$"
);
newtype!(
    ProductKey,
    "Key into the conversion-factor table, e.g. `raw_coffee_to_roasted`.",
    r"^[a-z0-9][a-z0-9_.-]{0,127}$"
);

/// What a GS1 EPC URN identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpcKind {
    /// Serialized trade item (`sgtin`).
    ItemInstance,
    /// Lot/batch class (`lgtin`).
    Lot,
    /// Physical location (`sgln`).
    Location,
    /// Logistics unit / shipment (`sscc`).
    Shipment,
    /// Anything else; still a valid EPC.
    Opaque,
}

/// Display-only breakdown of an EPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpcFields {
    /// Classified kind.
    pub kind: EpcKind,
    /// GS1 company prefix, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_prefix: Option<String>,
    /// Item, location or serial reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Serial number, lot number or extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

const EPC_SCHEMES: &[(&str, EpcKind)] = &[
    ("urn:epc:id:sgtin:", EpcKind::ItemInstance),
    ("urn:epc:class:lgtin:", EpcKind::Lot),
    ("urn:epc:id:sgln:", EpcKind::Location),
    ("urn:epc:id:sscc:", EpcKind::Shipment),
];

impl Epc {
    /// Splits a GS1 URN into its dotted fields. Never used for matching.
    pub fn describe(&self) -> EpcFields {
        for (prefix, kind) in EPC_SCHEMES {
            if let Some(rest) = self.0.strip_prefix(prefix) {
                let mut parts = rest.splitn(3, '.').map(str::to_string);
                return EpcFields {
                    kind: *kind,
                    company_prefix: parts.next().filter(|p| !p.is_empty()),
                    reference: parts.next(),
                    serial: parts.next(),
                };
            }
        }
        EpcFields {
            kind: EpcKind::Opaque,
            company_prefix: None,
            reference: None,
            serial: None,
        }
    }
}
