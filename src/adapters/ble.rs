//! Bluedroid GATT server adapter.
//!
//! Implements [`GattServer`]: one primary service per logical channel,
//! with notify characteristics for device → central traffic and write
//! characteristics for central → device commands.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid via the raw `esp_idf_svc::sys`
//!   GAP/GATTS API.
//! - **all other targets**: an in-memory stack with a [`SimCentral`]
//!   handle that plays the central's side in host tests.
//!
//! ## Registration sequence (device)
//!
//! Bluedroid registers attributes asynchronously, one event per step:
//!
//! ```text
//! REG ─▶ CREATE(svc 0) ─▶ ADD_CHAR ─▶ [ADD_CHAR_DESCR] ─▶ ADD_CHAR ... ─▶
//!        CREATE(svc 1) ─▶ ...                                         ─▶ advertise
//! ```
//!
//! Notify characteristics get a CCCD (0x2902) so centrals can subscribe.
//!
//! ## Long writes
//!
//! A value longer than one ATT packet arrives as "prepare write" fragments
//! followed by one "execute write". Fragments are queued per attribute and
//! the sink sees the assembled value once, on execute.

#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;
use std::sync::{Arc, PoisonError};

use log::info;

use crate::app::ports::{Access, CharacteristicSpec, GattEventSink, GattServer, PortError};
use crate::config::ConnectionParams;
use crate::link::registry::uuid128;

// ───────────────────────────────────────────────────────────────
// Attribute table (shared by both builds)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CharDef {
    uuid: String,
    access: Access,
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    handle: u16,
    /// Client configuration descriptor (notify characteristics only).
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    cccd: u16,
}

#[derive(Debug, Clone)]
struct ServiceDef {
    uuid: String,
    chars: Vec<CharDef>,
}

fn service_def(
    service: &str,
    characteristics: &[CharacteristicSpec<'_>],
) -> Result<ServiceDef, PortError> {
    uuid128(service).ok_or(PortError::InvalidUuid)?;
    let chars = characteristics
        .iter()
        .map(|c| {
            uuid128(c.uuid).ok_or(PortError::InvalidUuid)?;
            Ok(CharDef {
                uuid: c.uuid.to_owned(),
                access: c.access,
                handle: 0,
                cccd: 0,
            })
        })
        .collect::<Result<Vec<_>, PortError>>()?;
    Ok(ServiceDef {
        uuid: service.to_owned(),
        chars,
    })
}

/// Longest value a queued long write may assemble (ATT limit).
const MAX_ATTR_LEN: usize = 512;

/// Why a prepare-write fragment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrepareError {
    /// Offset past the end of the value queued so far.
    InvalidOffset,
    /// Assembled value would exceed [`MAX_ATTR_LEN`].
    TooLong,
}

/// Fragments of one long write, keyed by the attribute they target.
#[derive(Debug)]
struct PreparedWrite<K> {
    target: Option<K>,
    value: Vec<u8>,
}

impl<K: PartialEq> PreparedWrite<K> {
    const fn new() -> Self {
        Self {
            target: None,
            value: Vec::new(),
        }
    }

    /// Place `fragment` at `offset`. A fragment for another attribute
    /// starts a new queue.
    fn prepare(&mut self, target: K, offset: usize, fragment: &[u8]) -> Result<(), PrepareError> {
        if self.target.as_ref() != Some(&target) {
            self.target = Some(target);
            self.value.clear();
        }
        if offset > self.value.len() {
            return Err(PrepareError::InvalidOffset);
        }
        let end = offset + fragment.len();
        if end > MAX_ATTR_LEN {
            return Err(PrepareError::TooLong);
        }
        if end > self.value.len() {
            self.value.resize(end, 0);
        }
        self.value[offset..end].copy_from_slice(fragment);
        Ok(())
    }

    /// Empty the queue. With `commit`, hand back the assembled value.
    fn execute(&mut self, commit: bool) -> Option<(K, Vec<u8>)> {
        let target = self.target.take()?;
        let value = core::mem::take(&mut self.value);
        commit.then_some((target, value))
    }
}

// ═══════════════════════════════════════════════════════════════
// ESP-IDF build
// ═══════════════════════════════════════════════════════════════

// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures, so the table they work on lives in a static. GATTS callbacks
// run in the Bluedroid task (not ISR), so std Mutex is safe.
#[cfg(target_os = "espidf")]
static GATT: std::sync::Mutex<GattTable> = std::sync::Mutex::new(GattTable::new());

#[cfg(target_os = "espidf")]
struct GattTable {
    services: Vec<ServiceDef>,
    /// Registration cursor: service index, characteristic index.
    cursor: (usize, usize),
    service_handle: u16,
    gatts_if: u8,
    conn_id: Option<u16>,
    sink: Option<Arc<dyn GattEventSink>>,
    params: Option<ConnectionParams>,
    name: Option<std::ffi::CString>,
    prepared: PreparedWrite<u16>,
}

#[cfg(target_os = "espidf")]
impl GattTable {
    const fn new() -> Self {
        Self {
            services: Vec::new(),
            cursor: (0, 0),
            service_handle: 0,
            gatts_if: 0,
            conn_id: None,
            sink: None,
            params: None,
            name: None,
            prepared: PreparedWrite::new(),
        }
    }

    /// UUID of the writable characteristic at `handle`.
    fn writable_uuid(&self, handle: u16) -> Option<String> {
        self.by_handle(handle)
            .filter(|def| def.access == Access::Write)
            .map(|def| def.uuid.clone())
    }

    fn lookup(&self, uuid: &str) -> Option<&CharDef> {
        self.services
            .iter()
            .flat_map(|s| s.chars.iter())
            .find(|c| c.uuid == uuid)
    }

    fn by_handle(&self, handle: u16) -> Option<&CharDef> {
        self.services
            .iter()
            .flat_map(|s| s.chars.iter())
            .find(|c| c.handle == handle)
    }

    fn current_char(&mut self) -> Option<&mut CharDef> {
        let (s, c) = self.cursor;
        self.services.get_mut(s)?.chars.get_mut(c)
    }
}

#[cfg(target_os = "espidf")]
fn lock_table() -> std::sync::MutexGuard<'static, GattTable> {
    GATT.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    t.uuid.uuid128 = uuid.to_le_bytes();
    t
}

#[cfg(target_os = "espidf")]
fn uuid16_to_esp(uuid: u16) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 2;
    t.uuid.uuid16 = uuid;
    t
}

#[cfg(target_os = "espidf")]
const CCCD_UUID: u16 = 0x2902;

#[cfg(target_os = "espidf")]
fn esp_check(ret: esp_idf_svc::sys::esp_err_t, what: &str) -> Result<(), PortError> {
    if ret == esp_idf_svc::sys::ESP_OK as i32 {
        Ok(())
    } else {
        log::error!("BLE: {} failed ({})", what, ret);
        Err(PortError::Stack(ret))
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_advertising_raw() {
    use esp_idf_svc::sys::*;
    let mut adv_params = esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    };
    unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
}

#[cfg(target_os = "espidf")]
unsafe fn create_service(table: &GattTable) {
    use esp_idf_svc::sys::*;
    let Some(svc) = table.services.get(table.cursor.0) else {
        info!("BLE GATTS: all services registered, advertising");
        unsafe { start_advertising_raw() };
        return;
    };
    let Some(uuid) = uuid128(&svc.uuid) else {
        return;
    };
    let mut svc_id = esp_gatt_srvc_id_t {
        id: esp_gatt_id_t {
            uuid: uuid128_to_esp(uuid),
            inst_id: 0,
        },
        is_primary: true,
    };
    // service declaration + (declaration, value, CCCD) per characteristic
    let num_handle = 1 + 3 * svc.chars.len() as u16;
    unsafe { esp_ble_gatts_create_service(table.gatts_if, &mut svc_id, num_handle) };
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, def: &CharDef) {
    use esp_idf_svc::sys::*;
    let Some(uuid) = uuid128(&def.uuid) else {
        return;
    };
    let mut char_uuid = uuid128_to_esp(uuid);
    let (perm, prop) = match def.access {
        Access::Notify => (
            ESP_GATT_PERM_READ,
            ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
        ),
        Access::Write => (
            ESP_GATT_PERM_WRITE,
            ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
        ),
    };
    unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            core::ptr::null_mut(),
            core::ptr::null_mut(),
        );
    }
}

/// Move the cursor past the current characteristic and register the next
/// attribute (or the next service, or start advertising).
#[cfg(target_os = "espidf")]
unsafe fn advance(table: &mut GattTable) {
    let (s, c) = table.cursor;
    let chars = table.services.get(s).map_or(0, |svc| svc.chars.len());
    if c + 1 < chars {
        table.cursor = (s, c + 1);
        if let Some(def) = table.current_char() {
            let def = def.clone();
            unsafe { add_gatt_char(table.service_handle, &def) };
        }
    } else {
        table.cursor = (s + 1, 0);
        unsafe { create_service(table) };
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    _param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            info!("BLE GAP: advertising stopped");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_UPDATE_CONN_PARAMS_EVT => {
            info!("BLE GAP: connection parameters updated");
        }
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    let mut table = lock_table();

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            info!("BLE GATTS: app registered (if={})", gatts_if);
            table.gatts_if = gatts_if;
            if let Some(name) = table.name.as_ref() {
                unsafe { esp_ble_gap_set_device_name(name.as_ptr()) };
            }
            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..unsafe { core::mem::zeroed() }
            };
            unsafe { esp_ble_gap_config_adv_data(&mut adv_data) };
            table.cursor = (0, 0);
            unsafe { create_service(&table) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let p = unsafe { &(*param).create };
            table.service_handle = p.service_handle;
            info!("BLE GATTS: service created (handle={})", p.service_handle);
            unsafe { esp_ble_gatts_start_service(p.service_handle) };
            match table.current_char() {
                Some(def) => {
                    let def = def.clone();
                    unsafe { add_gatt_char(table.service_handle, &def) };
                }
                None => unsafe { advance(&mut table) },
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let p = unsafe { &(*param).add_char };
            let svc_handle = table.service_handle;
            let Some(def) = table.current_char() else {
                return;
            };
            def.handle = p.attr_handle;
            if def.access == Access::Notify {
                let mut cccd = uuid16_to_esp(CCCD_UUID);
                unsafe {
                    esp_ble_gatts_add_char_descr(
                        svc_handle,
                        &mut cccd,
                        (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                        core::ptr::null_mut(),
                        core::ptr::null_mut(),
                    );
                }
            } else {
                unsafe { advance(&mut table) };
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let p = unsafe { &(*param).add_char_descr };
            if let Some(def) = table.current_char() {
                def.cccd = p.attr_handle;
            }
            unsafe { advance(&mut table) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let p = unsafe { &(*param).connect };
            table.conn_id = Some(p.conn_id);
            info!("BLE GATTS: client connected (conn_id={})", p.conn_id);
            if let Some(params) = table.params {
                let mut update = esp_ble_conn_update_params_t {
                    bda: p.remote_bda,
                    min_int: params.min_interval,
                    max_int: params.max_interval,
                    latency: 0,
                    timeout: params.supervision_timeout,
                };
                unsafe { esp_ble_gap_update_conn_params(&mut update) };
            }
            let sink = table.sink.clone();
            drop(table);
            if let Some(sink) = sink {
                sink.on_connect();
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            table.conn_id = None;
            table.prepared.execute(false);
            info!("BLE GATTS: client disconnected");
            let sink = table.sink.clone();
            drop(table);
            if let Some(sink) = sink {
                sink.on_disconnect();
            }
            unsafe { start_advertising_raw() };
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            let p = unsafe { &(*param).mtu };
            info!("BLE GATTS: MTU {}", p.mtu);
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let data: &[u8] = if p.value.is_null() {
                &[]
            } else {
                unsafe { core::slice::from_raw_parts(p.value, p.len as usize) }
            };
            if p.is_prep {
                let status = match table.prepared.prepare(p.handle, usize::from(p.offset), data) {
                    Ok(()) => esp_gatt_status_t_ESP_GATT_OK,
                    Err(PrepareError::InvalidOffset) => esp_gatt_status_t_ESP_GATT_INVALID_OFFSET,
                    Err(PrepareError::TooLong) => esp_gatt_status_t_ESP_GATT_INVALID_ATTR_LEN,
                };
                if p.need_rsp {
                    // the client checks the echoed fragment against what it sent
                    let mut rsp: esp_gatt_rsp_t = unsafe { core::mem::zeroed() };
                    let attr = unsafe { &mut rsp.attr_value };
                    let n = data.len().min(attr.value.len());
                    attr.handle = p.handle;
                    attr.offset = p.offset;
                    attr.len = n as u16;
                    attr.value[..n].copy_from_slice(&data[..n]);
                    unsafe {
                        esp_ble_gatts_send_response(gatts_if, p.conn_id, p.trans_id, status, &mut rsp);
                    }
                }
                return;
            }
            if p.need_rsp {
                unsafe {
                    esp_ble_gatts_send_response(
                        gatts_if,
                        p.conn_id,
                        p.trans_id,
                        esp_gatt_status_t_ESP_GATT_OK,
                        core::ptr::null_mut(),
                    );
                }
            }
            let cccd = table
                .services
                .iter()
                .flat_map(|s| s.chars.iter())
                .find(|c| c.cccd != 0 && c.cccd == p.handle);
            if let Some(def) = cccd {
                info!("BLE GATTS: subscription change on {}", def.uuid);
                return;
            }
            let Some(uuid) = table.writable_uuid(p.handle) else {
                return;
            };
            let sink = table.sink.clone();
            drop(table);
            if let Some(sink) = sink {
                sink.on_write(&uuid, data);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            unsafe {
                esp_ble_gatts_send_response(
                    gatts_if,
                    p.conn_id,
                    p.trans_id,
                    esp_gatt_status_t_ESP_GATT_OK,
                    core::ptr::null_mut(),
                );
            }
            let commit = u32::from(p.exec_write_flag) == ESP_GATT_PREP_WRITE_EXEC;
            let Some((handle, value)) = table.prepared.execute(commit) else {
                return;
            };
            let Some(uuid) = table.writable_uuid(handle) else {
                return;
            };
            info!("BLE GATTS: long write of {} bytes on {}", value.len(), uuid);
            let sink = table.sink.clone();
            drop(table);
            if let Some(sink) = sink {
                sink.on_write(&uuid, &value);
            }
        }
        _ => {}
    }
}

/// Bluedroid-backed GATT server.
#[cfg(target_os = "espidf")]
pub struct BluedroidGatt {
    name: heapless::String<32>,
}

#[cfg(target_os = "espidf")]
impl BluedroidGatt {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self { name }
    }
}

#[cfg(target_os = "espidf")]
impl GattServer for BluedroidGatt {
    fn set_event_sink(&mut self, sink: Arc<dyn GattEventSink>) {
        lock_table().sink = Some(sink);
    }

    fn create_service(
        &mut self,
        service: &str,
        characteristics: &[CharacteristicSpec<'_>],
    ) -> Result<(), PortError> {
        let def = service_def(service, characteristics)?;
        lock_table().services.push(def);
        Ok(())
    }

    fn start_advertising(&mut self, params: &ConnectionParams) -> Result<(), PortError> {
        use esp_idf_svc::sys::*;
        {
            let mut table = lock_table();
            table.params = Some(*params);
            table.name = std::ffi::CString::new(self.name.as_str()).ok();
        }
        unsafe {
            // BLE-only: release classic BT controller memory
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            esp_check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            esp_check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            esp_check(esp_bluedroid_init(), "bluedroid_init")?;
            esp_check(esp_bluedroid_enable(), "bluedroid_enable")?;

            esp_check(
                esp_ble_gap_register_callback(Some(ble_gap_event_handler)),
                "gap_register_callback",
            )?;
            esp_check(
                esp_ble_gatts_register_callback(Some(ble_gatts_event_handler)),
                "gatts_register_callback",
            )?;
            esp_check(esp_ble_gatt_set_local_mtu(params.mtu), "set_local_mtu")?;
            esp_check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
        }
        info!("BLE(espidf): Bluedroid up, registering services as '{}'", self.name);
        Ok(())
    }

    fn notify(&mut self, uuid: &str, value: &[u8]) -> Result<(), PortError> {
        use esp_idf_svc::sys::*;
        let table = lock_table();
        let def = table.lookup(uuid).ok_or(PortError::UnknownCharacteristic)?;
        let conn_id = table.conn_id.ok_or(PortError::Io)?;
        let ret = unsafe {
            esp_ble_gatts_send_indicate(
                table.gatts_if,
                conn_id,
                def.handle,
                value.len() as u16,
                value.as_ptr().cast_mut(),
                false,
            )
        };
        esp_check(ret, "send_indicate")
    }

    fn connected_count(&self) -> usize {
        usize::from(lock_table().conn_id.is_some())
    }

    fn disconnect(&mut self) {
        let table = lock_table();
        if let Some(conn_id) = table.conn_id {
            unsafe { esp_idf_svc::sys::esp_ble_gatts_close(table.gatts_if, conn_id) };
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Host simulation
// ═══════════════════════════════════════════════════════════════

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimState {
    services: Vec<ServiceDef>,
    advertising: bool,
    connected: bool,
    sink: Option<Arc<dyn GattEventSink>>,
    params: Option<ConnectionParams>,
    notifications: Vec<(String, Vec<u8>)>,
    prepared: Option<PreparedWrite<String>>,
}

#[cfg(not(target_os = "espidf"))]
impl SimState {
    fn lookup(&self, uuid: &str) -> Option<&CharDef> {
        self.services
            .iter()
            .flat_map(|s| s.chars.iter())
            .find(|c| c.uuid == uuid)
    }
}

#[cfg(not(target_os = "espidf"))]
type SharedSim = Arc<Mutex<SimState>>;

/// In-memory GATT server.
#[cfg(not(target_os = "espidf"))]
pub struct BluedroidGatt {
    name: heapless::String<32>,
    state: SharedSim,
}

#[cfg(not(target_os = "espidf"))]
impl BluedroidGatt {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            name,
            state: SharedSim::default(),
        }
    }

    /// The central's side of the simulated link.
    pub fn sim_central(&self) -> SimCentral {
        SimCentral(Arc::clone(&self.state))
    }
}

#[cfg(not(target_os = "espidf"))]
fn lock_sim(state: &SharedSim) -> std::sync::MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(not(target_os = "espidf"))]
impl GattServer for BluedroidGatt {
    fn set_event_sink(&mut self, sink: Arc<dyn GattEventSink>) {
        lock_sim(&self.state).sink = Some(sink);
    }

    fn create_service(
        &mut self,
        service: &str,
        characteristics: &[CharacteristicSpec<'_>],
    ) -> Result<(), PortError> {
        let def = service_def(service, characteristics)?;
        lock_sim(&self.state).services.push(def);
        Ok(())
    }

    fn start_advertising(&mut self, params: &ConnectionParams) -> Result<(), PortError> {
        let mut state = lock_sim(&self.state);
        state.advertising = true;
        state.params = Some(*params);
        info!(
            "BLE(sim): advertising '{}' with {} services",
            self.name,
            state.services.len()
        );
        Ok(())
    }

    fn notify(&mut self, uuid: &str, value: &[u8]) -> Result<(), PortError> {
        let mut state = lock_sim(&self.state);
        let def = state.lookup(uuid).ok_or(PortError::UnknownCharacteristic)?;
        if def.access != Access::Notify {
            return Err(PortError::UnknownCharacteristic);
        }
        if !state.connected {
            return Err(PortError::Io);
        }
        state.notifications.push((uuid.to_owned(), value.to_vec()));
        Ok(())
    }

    fn connected_count(&self) -> usize {
        usize::from(lock_sim(&self.state).connected)
    }

    fn disconnect(&mut self) {
        SimCentral(Arc::clone(&self.state)).disconnect();
    }
}

/// Drives the simulated stack from the central's side.
#[cfg(not(target_os = "espidf"))]
#[derive(Clone)]
pub struct SimCentral(SharedSim);

#[cfg(not(target_os = "espidf"))]
impl SimCentral {
    pub fn connect(&self) {
        let sink = {
            let mut state = lock_sim(&self.0);
            if state.connected || !state.advertising {
                return;
            }
            state.connected = true;
            state.advertising = false;
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.on_connect();
        }
    }

    pub fn disconnect(&self) {
        let sink = {
            let mut state = lock_sim(&self.0);
            if !state.connected {
                return;
            }
            state.connected = false;
            state.advertising = true;
            state.prepared = None;
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.on_disconnect();
        }
    }

    /// Write to a characteristic. Returns `false` if it is not writable.
    pub fn write(&self, uuid: &str, value: &[u8]) -> bool {
        let sink = {
            let state = lock_sim(&self.0);
            let writable = state
                .lookup(uuid)
                .is_some_and(|c| c.access == Access::Write);
            if !writable || !state.connected {
                return false;
            }
            state.sink.clone()
        };
        if let Some(sink) = sink {
            sink.on_write(uuid, value);
        }
        true
    }

    /// Queue one fragment of a long write. Returns the fragment the server
    /// echoes back, or `None` if the request was refused.
    pub fn prepare_write(&self, uuid: &str, offset: usize, fragment: &[u8]) -> Option<Vec<u8>> {
        let mut state = lock_sim(&self.0);
        let writable = state
            .lookup(uuid)
            .is_some_and(|c| c.access == Access::Write);
        if !writable || !state.connected {
            return None;
        }
        state
            .prepared
            .get_or_insert_with(PreparedWrite::new)
            .prepare(uuid.to_owned(), offset, fragment)
            .ok()?;
        Some(fragment.to_vec())
    }

    /// Commit or cancel the queued long write. Returns `true` if a value
    /// was delivered.
    pub fn execute_write(&self, commit: bool) -> bool {
        let (delivery, sink) = {
            let mut state = lock_sim(&self.0);
            let delivery = state.prepared.as_mut().and_then(|q| q.execute(commit));
            (delivery, state.sink.clone())
        };
        let Some((uuid, value)) = delivery else {
            return false;
        };
        if let Some(sink) = sink {
            sink.on_write(&uuid, &value);
        }
        true
    }

    /// Write `value` as prepare requests of `fragment_len` bytes, then
    /// execute. Returns `false` if any fragment was refused.
    pub fn write_long(&self, uuid: &str, value: &[u8], fragment_len: usize) -> bool {
        for (i, fragment) in value.chunks(fragment_len.max(1)).enumerate() {
            if self.prepare_write(uuid, i * fragment_len, fragment).as_deref() != Some(fragment) {
                self.execute_write(false);
                return false;
            }
        }
        self.execute_write(true)
    }

    /// Drain every notification sent so far.
    pub fn take_notifications(&self) -> Vec<(String, Vec<u8>)> {
        core::mem::take(&mut lock_sim(&self.0).notifications)
    }

    pub fn is_advertising(&self) -> bool {
        lock_sim(&self.0).advertising
    }

    /// Service UUIDs in registration order.
    pub fn services(&self) -> Vec<String> {
        lock_sim(&self.0)
            .services
            .iter()
            .map(|s| s.uuid.clone())
            .collect()
    }

    /// Characteristic UUIDs of one service.
    pub fn characteristics(&self, service: &str) -> Vec<(String, Access)> {
        lock_sim(&self.0)
            .services
            .iter()
            .find(|s| s.uuid == service)
            .map(|s| s.chars.iter().map(|c| (c.uuid.clone(), c.access)).collect())
            .unwrap_or_default()
    }

    pub fn connection_params(&self) -> Option<ConnectionParams> {
        lock_sim(&self.0).params
    }
}
