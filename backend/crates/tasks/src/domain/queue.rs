use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority class of a task. Each class gets its own worker budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    Critical,
    #[default]
    Default,
}

impl QueueClass {
    pub const ALL: [QueueClass; 2] = [QueueClass::Critical, QueueClass::Default];

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Critical => "critical",
            QueueClass::Default => "default",
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(QueueClass::Critical),
            "default" => Ok(QueueClass::Default),
            other => Err(format!("unknown queue class: {other}")),
        }
    }
}
