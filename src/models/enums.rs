use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid enum value for {field}: {value}")]
pub struct InvalidEnum {
    pub field: &'static str,
    pub value: String,
}

/// Macro to generate enum with as_str + case-insensitive std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DoseStatus {
    Taken => "taken",
    Missed => "missed",
    Delayed => "delayed",
    Skipped => "skipped",
    Pending => "pending",
    Unknown => "unknown",
});

str_enum!(AlertSourceKind {
    Adherence => "adherence",
    Environment => "environment",
    Manual => "manual",
});

str_enum!(
    /// Declaration order is rank order: `Critical` compares greatest.
    #[derive(PartialOrd, Ord)]
    AlertSeverity {
        Info => "info",
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

str_enum!(ScopeKind {
    SelfOnly => "self",
    Household => "household",
    Managed => "managed",
});

str_enum!(TrendMetric {
    Temperature => "temperature",
    Humidity => "humidity",
});

str_enum!(
    #[derive(PartialOrd, Ord)]
    DeviceSeverity {
        Ok => "ok",
        Warning => "warning",
        Critical => "critical",
    }
);

str_enum!(
    #[derive(PartialOrd, Ord)]
    EnvironmentAlertLevel {
        Info => "info",
        Warning => "warning",
    }
);

str_enum!(EnvironmentAlertKind {
    HighHumidity => "high_humidity",
    HighTemperature => "high_temperature",
    Motion => "motion",
});

str_enum!(RecordKind {
    Dose => "dose",
    Sensor => "sensor",
    Alert => "alert",
});

str_enum!(ResourceKind {
    History => "history",
    Alerts => "alerts",
    Readings => "readings",
    Refills => "refills",
});

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::History,
        ResourceKind::Alerts,
        ResourceKind::Readings,
        ResourceKind::Refills,
    ];
}
