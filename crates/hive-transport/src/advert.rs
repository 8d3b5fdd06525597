//! Facts a transport asserts about itself

use std::time::Duration;

use hive_core::{Address, BucketPath, Envelope, HiveResult, Message, PeerId, Timestamp, Validity};
use hive_dispatch::Dispatcher;
use hive_time::DoAtInterval;

/// Sends signed, expiring proposals about a transport to the local brain
#[derive(Clone)]
pub struct Advertiser {
    dispatcher: Dispatcher,
    from: Address,
    period: Duration,
    ttl: Duration,
}

impl Advertiser {
    /// `role` names the sender below the node prefix, e.g. `udp-lan`
    pub fn new(dispatcher: &Dispatcher, role: &str, period: Duration, ttl: Duration) -> Self {
        Advertiser {
            dispatcher: dispatcher.with_prefix(dispatcher.node_address()),
            from: Address::from_segments([role]),
            period,
            ttl,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.dispatcher.identity().peer_id()
    }

    /// `peer/<self>/<leaf>`
    pub fn own_bucket(&self, leaf: &str) -> BucketPath {
        BucketPath::new(["peer".to_string(), self.peer_id().to_hex(), leaf.to_string()])
    }

    /// Re-advertisement schedule; the first run happens at startup
    pub fn schedule(&self) -> DoAtInterval {
        DoAtInterval::delayed(self.period)
    }

    pub fn advertise(&self, bucket: BucketPath, value: impl Into<String>) -> HiveResult<()> {
        let value = value.into();
        tracing::debug!(bucket = %bucket, value = %value, "advertising");
        let fact = Message::propose(bucket, value, Validity::starting(Timestamp::now(), self.ttl));
        self.dispatcher.dispatch(
            Envelope::new(self.from.clone(), self.dispatcher.brain_address(), fact),
            true,
        )?;
        Ok(())
    }
}
