//! Prefix router

use std::sync::Arc;

use tokio::sync::mpsc;

use hive_core::{Address, Envelope, HiveError, HiveResult};
use hive_crypto::{sign_message, Identity};

use crate::Mailbox;

#[derive(Debug)]
struct Route {
    address: Address,
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Collects registrations before the route table is frozen
pub struct DispatcherBuilder {
    identity: Arc<Identity>,
    routes: Vec<Route>,
}

impl DispatcherBuilder {
    /// `identity` signs envelopes dispatched with `sign = true`
    pub fn new(identity: Arc<Identity>) -> Self {
        DispatcherBuilder {
            identity,
            routes: Vec::new(),
        }
    }

    /// Register a mailbox. Registered addresses are literal.
    pub fn register(&mut self, address: Address) -> HiveResult<Mailbox> {
        if address.segments().iter().any(|s| s == hive_core::WILDCARD) {
            return Err(HiveError::InvalidAddress(format!(
                "{address}: wildcard in a registered address"
            )));
        }
        if self.routes.iter().any(|r| r.address == address) {
            return Err(HiveError::InvalidAddress(format!(
                "{address}: already registered"
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(address = %address, "mailbox registered");
        self.routes.push(Route {
            address: address.clone(),
            tx,
        });
        Ok(Mailbox::new(address, rx))
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            routes: self.routes.into(),
            prefix: Address::root(),
            identity: self.identity,
        }
    }
}

/// Cloneable handle onto a frozen route table
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<[Route]>,
    prefix: Address,
    identity: Arc<Identity>,
}

impl Dispatcher {
    /// A handle that prepends `prefix` to the sender of everything it
    /// dispatches
    pub fn with_prefix(&self, prefix: Address) -> Dispatcher {
        Dispatcher {
            routes: self.routes.clone(),
            prefix,
            identity: self.identity.clone(),
        }
    }

    pub fn prefix(&self) -> &Address {
        &self.prefix
    }

    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    /// `/swarm/<self>`, where this node's own mailboxes live
    pub fn node_address(&self) -> Address {
        Address::swarm(&self.identity.peer_id())
    }

    /// `/swarm/<self>/brain`
    pub fn brain_address(&self) -> Address {
        self.node_address().child("brain")
    }

    /// Addresses in the route table, in registration order
    pub fn registered(&self) -> Vec<Address> {
        self.routes.iter().map(|r| r.address.clone()).collect()
    }

    /// Deliver a copy to every mailbox whose address prefixes `envelope.to`.
    ///
    /// With `sign`, a Signature envelope over the contents goes to the same
    /// mailboxes just before the original. Returns the number of mailboxes
    /// reached; zero matches is [`HiveError::NoRoute`].
    pub fn dispatch(&self, mut envelope: Envelope, sign: bool) -> HiveResult<usize> {
        envelope.from = self.prefix.join(&envelope.from);

        let targets: Vec<&Route> = self
            .routes
            .iter()
            .filter(|r| envelope.to.match_prefix(&r.address).is_some())
            .collect();
        if targets.is_empty() {
            return Err(HiveError::NoRoute(envelope.to.to_string()));
        }

        let signature = if sign {
            let contents = sign_message(&self.identity, &envelope.contents)?;
            Some(Envelope::new(envelope.from.clone(), envelope.to.clone(), contents))
        } else {
            None
        };

        let mut delivered = 0;
        for route in &targets {
            if let Some(signature) = &signature {
                if route.tx.send(signature.clone()).is_err() {
                    continue;
                }
            }
            if route.tx.send(envelope.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            return Err(HiveError::MailboxClosed(envelope.to.to_string()));
        }
        tracing::trace!(
            from = %envelope.from,
            to = %envelope.to,
            kind = %envelope.contents.kind(),
            delivered,
            "dispatched"
        );
        Ok(delivered)
    }
}
