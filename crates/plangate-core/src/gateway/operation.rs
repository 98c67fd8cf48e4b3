use std::fmt;
use std::str::FromStr;

/// The five callable operations, named as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePlan,
    ReadPlan,
    UpdatePlan,
    DeletePlan,
    ListPlans,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::CreatePlan,
        Self::ReadPlan,
        Self::UpdatePlan,
        Self::DeletePlan,
        Self::ListPlans,
    ];

    /// What the caller was trying to do, for the unauthenticated message.
    fn action(self) -> &'static str {
        match self {
            Self::CreatePlan => "create a plan",
            Self::ReadPlan => "read a plan",
            Self::UpdatePlan => "update a plan",
            Self::DeletePlan => "delete a plan",
            Self::ListPlans => "list plans",
        }
    }

    /// Message returned with `Unauthenticated`.
    pub fn unauthenticated_message(self) -> String {
        format!("User must be authenticated to {}.", self.action())
    }

    /// Fixed message returned with `Internal`; also the log prefix.
    pub fn internal_message(self) -> &'static str {
        match self {
            Self::CreatePlan => "Error creating plan.",
            Self::ReadPlan => "Error reading plan.",
            Self::UpdatePlan => "Error updating plan.",
            Self::DeletePlan => "Error deleting plan.",
            Self::ListPlans => "Error listing plans.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreatePlan => "create_plan",
            Self::ReadPlan => "read_plan",
            Self::UpdatePlan => "update_plan",
            Self::DeletePlan => "delete_plan",
            Self::ListPlans => "list_plans",
        };
        f.write_str(s)
    }
}

impl FromStr for Operation {
    type Err = OperationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_plan" => Ok(Self::CreatePlan),
            "read_plan" => Ok(Self::ReadPlan),
            "update_plan" => Ok(Self::UpdatePlan),
            "delete_plan" => Ok(Self::DeletePlan),
            "list_plans" => Ok(Self::ListPlans),
            other => Err(OperationParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an unknown [`Operation`] name.
#[derive(Debug, Clone)]
pub struct OperationParseError(pub String);

impl fmt::Display for OperationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation: {:?}", self.0)
    }
}

impl std::error::Error for OperationParseError {}
