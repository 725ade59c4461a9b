//! NimBLE GATT server: credential and status services.
//!
//! # GATT layout
//!
//! ```text
//! Credential service 19b10000-e8f2-537e-4f6c-d104768a1214
//! └── Credential characteristic 19b10001-... (Write, capture each write)
//! Status service 0xFF01
//! └── Status characteristic 0xFF02 (Notify)
//! ```
//!
//! NimBLE callbacks run on the BLE host task; they hand events to the
//! provisioning task over an unbounded channel tagged with the connection
//! handle, which preserves submission order for rapid writes and lets a link
//! ignore events left over from an earlier connection.

use crate::config::DeviceConfig;
use crate::provisioning::{
    Advertiser, ProvisioningLink, SessionEvent, StatusLine, TransportError, MTU_TARGET,
};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, NimbleProperties};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;

/// Credential service, advertised so peers can find the device.
pub const CREDENTIAL_SERVICE_UUID: BleUuid = uuid128!("19b10000-e8f2-537e-4f6c-d104768a1214");

/// Write-only credential characteristic.
pub const CREDENTIAL_CHAR_UUID: BleUuid = uuid128!("19b10001-e8f2-537e-4f6c-d104768a1214");

/// Status service.
pub const STATUS_SERVICE_UUID: BleUuid = BleUuid::Uuid16(0xFF01);

/// Notify-only status characteristic.
pub const STATUS_CHAR_UUID: BleUuid = BleUuid::Uuid16(0xFF02);

type EventSender = mpsc::UnboundedSender<(u16, SessionEvent)>;

/// Owns the GATT services and turns peer connections into [`BleLink`]s.
///
/// The NimBLE callbacks are registered once; each advertise cycle installs a
/// fresh event queue, so events from a finished connection cannot leak into
/// the next session.
pub struct BleAdvertiser {
    device_name: &'static str,
    event_slot: Arc<StdMutex<EventSender>>,
    conn_rx: mpsc::UnboundedReceiver<u16>,
    status_char: Arc<NimbleMutex<BLECharacteristic>>,
}

impl BleAdvertiser {
    /// Initialize the BLE stack and register the provisioning services.
    pub fn new(config: &DeviceConfig) -> Self {
        let device = BLEDevice::take();
        if let Err(e) = device.set_preferred_mtu(MTU_TARGET) {
            warn!("could not register preferred MTU: {:?}", e);
        }
        let server = device.get_server();

        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        // Placeholder sender; advertise() installs the real queue per cycle.
        let (event_tx, _) = mpsc::unbounded_channel();
        let event_slot = Arc::new(StdMutex::new(event_tx));

        server.on_connect(move |_server, desc| {
            let _ = conn_tx.send(desc.conn_handle());
        });

        let disconnect_slot = event_slot.clone();
        server.on_disconnect(move |desc, _reason| {
            let _ = disconnect_slot
                .lock()
                .unwrap()
                .send((desc.conn_handle(), SessionEvent::Disconnected));
        });

        let service = server.create_service(CREDENTIAL_SERVICE_UUID);
        let credential_char = service
            .lock()
            .create_characteristic(CREDENTIAL_CHAR_UUID, NimbleProperties::WRITE);
        let write_slot = event_slot.clone();
        credential_char.lock().on_write(move |args| {
            let event = SessionEvent::CredentialWrite(args.recv_data().to_vec());
            let _ = write_slot
                .lock()
                .unwrap()
                .send((args.desc().conn_handle(), event));
        });

        let status_service = server.create_service(STATUS_SERVICE_UUID);
        let status_char = status_service
            .lock()
            .create_characteristic(STATUS_CHAR_UUID, NimbleProperties::NOTIFY);

        Self {
            device_name: config.device_name,
            event_slot,
            conn_rx,
            status_char,
        }
    }
}

impl Advertiser for BleAdvertiser {
    type Link = BleLink;

    async fn advertise(&mut self) -> Result<BleLink, TransportError> {
        // Fresh event queue before advertising starts, so a write racing in
        // right after the connect event is already captured for this session.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        *self.event_slot.lock().unwrap() = event_tx;

        let advertising = BLEDevice::take().get_advertising();
        advertising
            .lock()
            .set_data(
                BLEAdvertisementData::new()
                    .name(self.device_name)
                    .add_service_uuid(CREDENTIAL_SERVICE_UUID),
            )
            .map_err(|e| TransportError::Advertise(format!("{:?}", e)))?;
        advertising
            .lock()
            .start()
            .map_err(|e| TransportError::Advertise(format!("{:?}", e)))?;
        info!("advertising as {}", self.device_name);

        let conn = self
            .conn_rx
            .recv()
            .await
            .ok_or_else(|| TransportError::Advertise("connection channel closed".into()))?;

        Ok(BleLink {
            conn,
            peer: format!("conn {}", conn),
            events: event_rx,
            status_char: self.status_char.clone(),
        })
    }
}

/// One live peer connection.
pub struct BleLink {
    conn: u16,
    peer: String,
    events: mpsc::UnboundedReceiver<(u16, SessionEvent)>,
    status_char: Arc<NimbleMutex<BLECharacteristic>>,
}

impl ProvisioningLink for BleLink {
    async fn exchange_mtu(&mut self, mtu: u16) -> Result<(), TransportError> {
        // The ATT exchange itself is peer-initiated; NimBLE answers it with
        // the preferred MTU registered at startup.
        debug!("preferred MTU {} registered with the stack", mtu);
        Ok(())
    }

    async fn next_event(&mut self) -> SessionEvent {
        loop {
            match self.events.recv().await {
                Some((conn, event)) if conn == self.conn => return event,
                Some((conn, _)) => debug!("ignoring event from old connection {}", conn),
                None => return SessionEvent::Disconnected,
            }
        }
    }

    async fn send_status(&mut self, line: &StatusLine) -> Result<(), TransportError> {
        if BLEDevice::take().get_server().connected_count() == 0 {
            return Err(TransportError::PeerGone);
        }
        self.status_char
            .lock()
            .set_value(line.to_wire().as_bytes())
            .notify();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let server = BLEDevice::take().get_server();
        if server.connected_count() == 0 {
            debug!("connection {} already closed", self.conn);
            return Ok(());
        }
        server
            .disconnect(self.conn)
            .map_err(|e| TransportError::Disconnect(format!("{:?}", e)))
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
