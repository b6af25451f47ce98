use crate::error::BookingError;
use uuid::Uuid;

/// Who is invoking a core operation. Passed explicitly into every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Member(Uuid),
    Admin(Uuid),
}

impl Actor {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Member(id) | Self::Admin(id) => *id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    pub fn require_admin(&self) -> Result<Uuid, BookingError> {
        match self {
            Self::Admin(id) => Ok(*id),
            Self::Member(_) => Err(BookingError::Forbidden(
                "Only studio admins may perform this action".to_string(),
            )),
        }
    }

    /// Admins act on anyone's behalf; members only on their own
    pub fn may_act_for(&self, user_id: Option<Uuid>) -> bool {
        match self {
            Self::Admin(_) => true,
            Self::Member(id) => user_id == Some(*id),
        }
    }
}
