use std::{sync::Arc, time::Duration};

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BrokerTransport, ControlChannelConfig},
    control::decoder::ControlDecoder,
};

/// Pause between polls after a connection error; the event loop reconnects on
/// the next poll.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CHAN_CAP: usize = 10;
const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

pub(crate) fn mqtt_options(config: &ControlChannelConfig) -> MqttOptions {
    let client_id = format!("ws-video-{}", config.camera_id());
    let mut options = match config.transport() {
        BrokerTransport::Tcp => MqttOptions::new(client_id, config.host(), config.port()),
        BrokerTransport::Ws => {
            let url = format!("ws://{}:{}/mqtt", config.host(), config.port());
            let mut options = MqttOptions::new(client_id, url, config.port());
            options.set_transport(Transport::Ws);
            options
        }
    };
    options.set_keep_alive(Duration::from_secs(60));
    options
}

/// Subscribes to the control topic for the lifetime of the process and feeds
/// every message to `decoder`.
pub(crate) fn start_control_subscriber(
    config: &ControlChannelConfig,
    decoder: Arc<ControlDecoder>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let options = mqtt_options(config);
    let topic = config.topic().to_string();
    log::info!(
        "control: connecting to {}:{} ({:?}), topic {}, camera {}",
        config.host(),
        config.port(),
        config.transport(),
        topic,
        decoder.camera_id()
    );

    tokio::spawn(async move {
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHAN_CAP);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if client.try_disconnect().is_ok() {
                        // one more poll writes the DISCONNECT packet
                        let _ = tokio::time::timeout(DISCONNECT_FLUSH, eventloop.poll()).await;
                    }
                    log::info!("control: subscriber cancelled");
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        log::info!("control: connected ({:?}), subscribing to {}", ack.code, topic);
                        // a clean session forgets subscriptions, so renew on every connect
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                            log::warn!("control: subscribe {} failed: {}", topic, e);
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        log::info!("control: subscribed to {}", topic);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic == topic {
                            decoder.handle_payload(&publish.payload);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("control: broker connection error: {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                },
            }
        }
    })
}
