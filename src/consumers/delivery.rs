use amq_protocol_types::DeliveryTag;

/// A message received from the session's queue.
///
/// The delivery tag is assigned by the broker and is only meaningful on the channel that
/// received the message, until it is acknowledged or the channel closes.
/// Pass the delivery back to [`BrokerSession::acknowledge`](crate::consumers::BrokerSession::acknowledge)
/// to confirm processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDelivery {
    payload: Vec<u8>,
    delivery_tag: DeliveryTag,
}

impl MessageDelivery {
    pub fn new(payload: Vec<u8>, delivery_tag: DeliveryTag) -> Self {
        Self {
            payload,
            delivery_tag,
        }
    }

    /// The payload of the message in binary format.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn delivery_tag(&self) -> DeliveryTag {
        self.delivery_tag
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl From<lapin::message::Delivery> for MessageDelivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self::new(value.data, value.delivery_tag)
    }
}
