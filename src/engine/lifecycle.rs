//! Settlement state machine for conversions.

use crate::domain::ConversionStatus;
use crate::error::LedgerError;

/// Admin actions that move a conversion between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Pay,
    Cancel,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Pay => "pay",
            Transition::Cancel => "cancel",
        }
    }

    /// Status reached by applying this action to `from`.
    ///
    /// # Errors
    /// `InvalidStatus` for any move the state machine does not allow.
    pub fn apply(&self, from: ConversionStatus) -> Result<ConversionStatus, LedgerError> {
        use ConversionStatus::*;

        let to = match (self, from) {
            (Transition::Confirm, Pending) => Confirmed,
            (Transition::Pay, Confirmed) => Paid,
            (Transition::Cancel, Pending | Confirmed) => Cancelled,
            _ => {
                return Err(LedgerError::InvalidStatus {
                    from,
                    action: self.as_str(),
                })
            }
        };
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversionStatus::*;

    #[test]
    fn test_allowed_transitions() {
        assert_eq!(Transition::Confirm.apply(Pending).unwrap(), Confirmed);
        assert_eq!(Transition::Pay.apply(Confirmed).unwrap(), Paid);
        assert_eq!(Transition::Cancel.apply(Pending).unwrap(), Cancelled);
        assert_eq!(Transition::Cancel.apply(Confirmed).unwrap(), Cancelled);
    }

    #[test]
    fn test_rejected_transitions() {
        let rejected = [
            (Transition::Pay, Pending),
            (Transition::Cancel, Paid),
            (Transition::Cancel, Cancelled),
            (Transition::Confirm, Confirmed),
            (Transition::Confirm, Paid),
            (Transition::Confirm, Cancelled),
            (Transition::Pay, Paid),
            (Transition::Pay, Cancelled),
        ];
        for (action, from) in rejected {
            match action.apply(from) {
                Err(LedgerError::InvalidStatus { from: f, action: a }) => {
                    assert_eq!(f, from);
                    assert_eq!(a, action.as_str());
                }
                other => panic!("{:?} from {:?} should fail, got {:?}", action, from, other),
            }
        }
    }
}
