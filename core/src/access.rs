//! Owner capability check

use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::Address;
use serde::{Deserialize, Serialize};

/// Single-owner capability guarding administrative operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    owner: Address,
}

impl Ownership {
    pub fn new(owner: Address) -> Result<Self> {
        if owner.is_zero() {
            return Err(EngineError::invalid("owner cannot be the zero address"));
        }
        Ok(Self { owner })
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<()> {
        if caller != &self.owner {
            return Err(EngineError::unauthorized(format!(
                "{} is not the owner",
                caller
            )));
        }
        Ok(())
    }

    /// Hand the capability to `new_owner`. Only the current owner may do this.
    pub fn transfer(&mut self, caller: &Address, new_owner: Address) -> Result<Event> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(EngineError::invalid("new owner cannot be the zero address"));
        }

        let previous = std::mem::replace(&mut self.owner, new_owner);
        Ok(Event::OwnershipTransferred {
            previous,
            owner: new_owner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_owner_gate() {
        let owner = Address::repeat_byte(1);
        let stranger = Address::repeat_byte(2);
        let ownership = Ownership::new(owner).unwrap();

        assert!(ownership.ensure_owner(&owner).is_ok());
        let err = ownership.ensure_owner(&stranger).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);
    }

    #[test]
    fn test_transfer_ownership() {
        let owner = Address::repeat_byte(1);
        let next = Address::repeat_byte(3);
        let mut ownership = Ownership::new(owner).unwrap();

        let event = ownership.transfer(&owner, next).unwrap();
        assert_eq!(
            event,
            Event::OwnershipTransferred {
                previous: owner,
                owner: next
            }
        );
        assert_eq!(ownership.owner(), &next);
        assert!(ownership.ensure_owner(&owner).is_err());
    }

    #[test]
    fn test_rejects_zero_owner() {
        assert!(Ownership::new(Address::ZERO).is_err());

        let owner = Address::repeat_byte(1);
        let mut ownership = Ownership::new(owner).unwrap();
        let err = ownership.transfer(&owner, Address::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(ownership.owner(), &owner);
    }
}
