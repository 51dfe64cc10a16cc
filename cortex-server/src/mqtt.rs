use cortex_common::records::decision::DecisionType;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;

fn decision_kind_topic_segment(decision_type: DecisionType) -> &'static str {
    match decision_type {
        DecisionType::NovaServer => "nova",
        DecisionType::CinderVolume => "cinder",
        DecisionType::Pod => "pod",
        DecisionType::ManilaShare => "manila",
    }
}

/// Best-effort fan-out of finished pipeline runs (spec §6 "MQTT topics").
/// A publish failure is logged and never fails the HTTP request that
/// triggered it (spec §4.4).
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Connects to `broker_addr` (`host:port`) and drives the connection's
    /// event loop on a background task, mirroring how the teacher's own
    /// long-lived client loops (e.g. the etcd watch stream) are driven by
    /// a dedicated task rather than polled inline.
    pub fn connect(broker_addr: &str, client_id: &str) -> anyhow::Result<Self> {
        let (host, port) = broker_addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("mqtt broker address must be host:port, got {broker_addr}"))?;
        let port: u16 = port.parse()?;
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("mqtt event loop error: {e}, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok(Self { client })
    }

    pub async fn publish_finished(&self, decision_type: DecisionType, decision_id: &str) {
        let topic = format!("cortex/scheduler/{}/pipeline/finished", decision_kind_topic_segment(decision_type));
        if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, false, decision_id.as_bytes()).await {
            log::warn!("mqtt publish failed for decision {decision_id}: {e}");
        }
    }
}
