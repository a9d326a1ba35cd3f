//! Origin enable/disable commands.

use std::fmt;

use thiserror::Error;

use crate::registry::Id;

/// Errors raised while building or applying an origin command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', cmd can be enable_origin|disable_origin")]
    UnknownCommand(String),

    #[error("cmd, appId and originId are all required parameters, missing {0}")]
    MissingParameter(&'static str),

    #[error("application with id={0} is not found")]
    UnknownApplication(Id),

    #[error("origin with id={origin_id} is not found for application={application_id}")]
    UnknownOrigin { application_id: Id, origin_id: Id },
}

/// Message asking the origins inventory to admit or stop traffic to one origin.
///
/// Compared and hashed structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginCommand {
    EnableOrigin { application_id: Id, origin_id: Id },
    DisableOrigin { application_id: Id, origin_id: Id },
}

impl OriginCommand {
    pub fn enable(application_id: impl Into<Id>, origin_id: impl Into<Id>) -> Self {
        Self::EnableOrigin {
            application_id: application_id.into(),
            origin_id: origin_id.into(),
        }
    }

    pub fn disable(application_id: impl Into<Id>, origin_id: impl Into<Id>) -> Self {
        Self::DisableOrigin {
            application_id: application_id.into(),
            origin_id: origin_id.into(),
        }
    }

    /// Build a command from admin-style parameters
    /// (`cmd=enable_origin&appId=..&originId=..`).
    pub fn parse(cmd: &str, application_id: &str, origin_id: &str) -> Result<Self, CommandError> {
        if cmd.is_empty() {
            return Err(CommandError::MissingParameter("cmd"));
        }
        if application_id.is_empty() {
            return Err(CommandError::MissingParameter("appId"));
        }
        if origin_id.is_empty() {
            return Err(CommandError::MissingParameter("originId"));
        }

        match cmd {
            "enable_origin" => Ok(Self::enable(application_id, origin_id)),
            "disable_origin" => Ok(Self::disable(application_id, origin_id)),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }

    pub fn application_id(&self) -> &Id {
        match self {
            Self::EnableOrigin { application_id, .. } | Self::DisableOrigin { application_id, .. } => {
                application_id
            }
        }
    }

    pub fn origin_id(&self) -> &Id {
        match self {
            Self::EnableOrigin { origin_id, .. } | Self::DisableOrigin { origin_id, .. } => origin_id,
        }
    }

    /// True if this command targets the given application.
    pub fn for_app(&self, application_id: &Id) -> bool {
        self.application_id() == application_id
    }
}

impl fmt::Display for OriginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EnableOrigin { .. } => "enable_origin",
            Self::DisableOrigin { .. } => "disable_origin",
        };
        write!(f, "{}({}/{})", name, self.application_id(), self.origin_id())
    }
}
