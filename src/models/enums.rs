use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ObservationStatus {
    Final => "final",
    Preliminary => "preliminary",
    Amended => "amended",
    EnteredInError => "entered_in_error",
});

str_enum!(ValueKind {
    Quantity => "quantity",
    Text => "text",
    Coded => "coded",
});

str_enum!(EnrollmentStatus {
    Active => "active",
    Completed => "completed",
    Withdrawn => "withdrawn",
});

str_enum!(RiskCategory {
    WellControlled => "well_controlled",
    NeedsAttention => "needs_attention",
    HighRisk => "high_risk",
    NoData => "no_data",
});
