use parking_lot::RwLock;

use crate::types::Address;

/// Supplies the current actor and whether the session is connected.
pub trait IdentityProvider: Send + Sync {
    fn actor(&self) -> Option<Address>;

    fn is_connected(&self) -> bool;

    /// The actor, only while connected.
    fn connected_actor(&self) -> Option<Address> {
        if self.is_connected() {
            self.actor()
        } else {
            None
        }
    }
}

/// Process-local session that can be connected and disconnected at runtime.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    actor: RwLock<Option<Address>>,
}

impl SessionIdentity {
    pub fn connected(actor: Address) -> Self {
        Self {
            actor: RwLock::new(Some(actor)),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connect(&self, actor: Address) {
        *self.actor.write() = Some(actor);
    }

    pub fn disconnect(&self) {
        *self.actor.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn actor(&self) -> Option<Address> {
        self.actor.read().clone()
    }

    fn is_connected(&self) -> bool {
        self.actor.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_drops_actor() {
        let session = SessionIdentity::connected(Address::from("0xa"));
        assert_eq!(session.connected_actor(), Some(Address::from("0xa")));
        session.disconnect();
        assert!(!session.is_connected());
        assert_eq!(session.connected_actor(), None);
    }

    #[test]
    fn reconnect_restores_actor() {
        let session = SessionIdentity::disconnected();
        assert_eq!(session.connected_actor(), None);
        session.connect(Address::from("0xb"));
        assert_eq!(session.connected_actor(), Some(Address::from("0xb")));
    }
}
