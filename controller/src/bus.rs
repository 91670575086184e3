use hvac_common::{BusError, MessageBus};
use rumqttc::{AsyncClient, QoS};

/// Fire-and-forget publishing over the shared MQTT connection. Requests are
/// queued to the event loop without waiting, so a slow broker never stalls a
/// control tick.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl MessageBus for MqttBus {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|err| BusError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }
}
