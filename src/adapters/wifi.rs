//! WiFi station bring-up for the socket transport.
//!
//! The socket pair is bound only after the station has an IP address.
//! Credentials come from the build environment (`ARCTIC_WIFI_SSID`,
//! `ARCTIC_WIFI_PASS`); an empty password selects an open network.

use anyhow::{Result, anyhow, bail};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

pub type Station = BlockingWifi<EspWifi<'static>>;

/// Build-time credentials, if both were provided.
pub fn credentials() -> Option<(&'static str, &'static str)> {
    Some((option_env!("ARCTIC_WIFI_SSID")?, option_env!("ARCTIC_WIFI_PASS").unwrap_or("")))
}

/// Join `ssid` and block until the network interface is up. The returned
/// handle must stay alive for as long as the link is used.
pub fn connect_station(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    ssid: &str,
    password: &str,
) -> Result<Station> {
    if ssid.is_empty() {
        bail!("WiFi SSID cannot be empty");
    }
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if password.is_empty() {
        warn!("WIFI: empty password, joining open network");
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: ssid
            .try_into()
            .map_err(|_| anyhow!("invalid SSID '{}'", ssid))?,
        password: password
            .try_into()
            .map_err(|_| anyhow!("invalid WiFi password"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("WIFI: connecting to '{}'", ssid);
    wifi.connect()?;
    wifi.wait_netif_up()?;

    let ip = wifi.wifi().sta_netif().get_ip_info()?;
    info!("WIFI: connected, address {}", ip.ip);
    Ok(wifi)
}
