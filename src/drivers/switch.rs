//! Serial driver for a Pocket-Powerbox-class power/dew controller.
//!
//! Protocol: newline-terminated commands at 9600 baud. The poller walks
//! four status commands (`PA`, `PC`, `PS`, `DA`) and splits their
//! colon-delimited replies into the cached channel values; every write is
//! echo-verified by the firmware.

use super::{split_status, DeviceConnection};
use crate::api::{Device, Switch};
use crate::transport::{ReadExpectation, SerialConfig, SerialTransport, Transport};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Selectable output voltages of the adjustable rail.
const ADJUSTABLE_VOLTAGES: [u32; 6] = [3, 5, 7, 8, 9, 12];

/// The channel map of the power box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum Channel {
    InputVoltage = 0,
    TotalCurrent = 1,
    QuadCurrent = 2,
    Power = 3,
    Temperature = 4,
    Humidity = 5,
    DewPoint = 6,
    QuadOutput = 7,
    AdjustableOutput = 8,
    AdjustableVoltage = 9,
    DewAPwm = 10,
    DewBPwm = 11,
    DewACurrent = 12,
    DewBCurrent = 13,
    AutoDew = 14,
    PowerWarning = 15,
    Uptime = 16,
    DewAggressiveness = 17,
    Usb2Ports = 18,
}

const CHANNEL_COUNT: i32 = 19;

impl Channel {
    fn from_id(id: i32) -> ASCOMResult<Self> {
        use Channel::{
            AdjustableOutput, AdjustableVoltage, AutoDew, DewACurrent, DewAPwm, DewAggressiveness,
            DewBCurrent, DewBPwm, DewPoint, Humidity, InputVoltage, Power, PowerWarning,
            QuadCurrent, QuadOutput, Temperature, TotalCurrent, Uptime, Usb2Ports,
        };
        Ok(match id {
            0 => InputVoltage,
            1 => TotalCurrent,
            2 => QuadCurrent,
            3 => Power,
            4 => Temperature,
            5 => Humidity,
            6 => DewPoint,
            7 => QuadOutput,
            8 => AdjustableOutput,
            9 => AdjustableVoltage,
            10 => DewAPwm,
            11 => DewBPwm,
            12 => DewACurrent,
            13 => DewBCurrent,
            14 => AutoDew,
            15 => PowerWarning,
            16 => Uptime,
            17 => DewAggressiveness,
            18 => Usb2Ports,
            _ => {
                return Err(ASCOMError::invalid_value(format_args!(
                    "{id} is not a valid switch index"
                )))
            }
        })
    }

    const fn writable(self) -> bool {
        matches!(
            self,
            Self::QuadOutput
                | Self::AdjustableOutput
                | Self::AdjustableVoltage
                | Self::DewAPwm
                | Self::DewBPwm
                | Self::AutoDew
                | Self::DewAggressiveness
                | Self::Usb2Ports
        )
    }

    const fn name(self) -> &'static str {
        match self {
            Self::InputVoltage => "Voltage",
            Self::TotalCurrent => "Total Current",
            Self::QuadCurrent => "Current 12V",
            Self::Power => "Power",
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::DewPoint => "DewPoint",
            Self::QuadOutput => "Quad 12V Output",
            Self::AdjustableOutput => "Adj Power Output",
            Self::AdjustableVoltage => "Adj Power Voltage",
            Self::DewAPwm => "DewA PWM",
            Self::DewBPwm => "DewB PWM",
            Self::DewACurrent => "DewA Power",
            Self::DewBCurrent => "DewB Power",
            Self::AutoDew => "Auto Dew",
            Self::PowerWarning => "Power Warning",
            Self::Uptime => "Uptime",
            Self::DewAggressiveness => "Autodew Aggressiveness",
            Self::Usb2Ports => "USB2 Ports",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::InputVoltage => "Input Voltage",
            Self::TotalCurrent => "Current in Amps",
            Self::QuadCurrent => "Quad 12V Current in Amps",
            Self::Power => "Power in Watts",
            Self::Temperature => "Temperature in Celsius",
            Self::Humidity => "Humidity %",
            Self::DewPoint => "Dew Point in Celsius",
            Self::QuadOutput => "Quad 12V Output On/Off",
            Self::AdjustableOutput => "Adjustable Power Output On/Off",
            Self::AdjustableVoltage => "Adjustable Power Voltage (3/5/7/8/9/12)",
            Self::DewAPwm => "Dew Heater A PWM Set Point (0-255)",
            Self::DewBPwm => "Dew Heater B PWM Set Point (0-255)",
            Self::DewACurrent => "Dew Heater A Current in Amps",
            Self::DewBCurrent => "Dew Heater B Current in Amps",
            Self::AutoDew => "AutoDew (On/Off)",
            Self::PowerWarning => "Power Warning",
            Self::Uptime => "Minutes of Uptime",
            Self::DewAggressiveness => {
                "Auto Dew Aggressiveness, a higher value sets higher power based on humidity (1-254)"
            }
            Self::Usb2Ports => "USB2 Ports (On/Off)",
        }
    }

    /// `(min, max, step)` of the channel's analogue value.
    const fn bounds(self) -> (f64, f64, f64) {
        match self {
            Self::InputVoltage => (0.0, 15.0, 0.1),
            Self::TotalCurrent | Self::QuadCurrent | Self::DewACurrent | Self::DewBCurrent => {
                (0.0, 20.0, 0.1)
            }
            Self::Power => (0.0, 250.0, 0.1),
            Self::Temperature | Self::DewPoint => (-40.0, 60.0, 0.1),
            Self::Humidity => (0.0, 100.0, 1.0),
            Self::QuadOutput
            | Self::AdjustableOutput
            | Self::AutoDew
            | Self::PowerWarning
            | Self::Usb2Ports => (0.0, 1.0, 1.0),
            Self::AdjustableVoltage => (3.0, 12.0, 1.0),
            Self::DewAPwm | Self::DewBPwm => (0.0, 255.0, 1.0),
            Self::Uptime => (0.0, f64::MAX, 1.0),
            Self::DewAggressiveness => (1.0, 254.0, 1.0),
        }
    }
}

/// Snapshot of the controller's status lines.
///
/// The USB2 state is not part of any status line, so it is tracked from
/// writes; the ports power up enabled.
#[derive(Debug, Clone, Copy)]
struct PowerBoxStatus {
    usb2_on: bool,
    input_voltage: f64,
    total_current: f64,
    quad_current: f64,
    power: f64,
    temperature: f64,
    humidity: f64,
    dew_point: f64,
    quad_on: bool,
    adjustable_on: bool,
    adjustable_voltage: f64,
    dew_a_pwm: f64,
    dew_b_pwm: f64,
    dew_a_current: f64,
    dew_b_current: f64,
    auto_dew: bool,
    power_warning: bool,
    uptime_minutes: f64,
    dew_aggressiveness: f64,
}

impl Default for PowerBoxStatus {
    fn default() -> Self {
        Self {
            usb2_on: true,
            input_voltage: 0.0,
            total_current: 0.0,
            quad_current: 0.0,
            power: 0.0,
            temperature: 0.0,
            humidity: 0.0,
            dew_point: 0.0,
            quad_on: false,
            adjustable_on: false,
            adjustable_voltage: 0.0,
            dew_a_pwm: 0.0,
            dew_b_pwm: 0.0,
            dew_a_current: 0.0,
            dew_b_current: 0.0,
            auto_dew: false,
            power_warning: false,
            uptime_minutes: 0.0,
            dew_aggressiveness: 0.0,
        }
    }
}

/// A Pocket-Powerbox-class power/dew controller on a serial port.
#[derive(Debug)]
pub struct PowerBoxSwitch {
    name: String,
    device_path: String,
    state: Arc<Mutex<PowerBoxStatus>>,
    connection: RwLock<Option<DeviceConnection>>,
}

async fn exchange_line(transport: &dyn Transport, command: &str) -> ASCOMResult<String> {
    let raw = transport
        .exchange(command.as_bytes(), ReadExpectation::Terminated(b'\n'))
        .await?;
    String::from_utf8(raw).map_err(|err| {
        ASCOMError::driver_error(format_args!("Switch sent non-ASCII reply: {err}"))
    })
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize) -> ASCOMResult<T> {
    fields
        .get(index)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| {
            ASCOMError::driver_error(format_args!("Missing or bad status field {index}"))
        })
}

async fn refresh(transport: &dyn Transport, state: &Mutex<PowerBoxStatus>) -> ASCOMResult<()> {
    let line = exchange_line(transport, "PA\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"PPBA") || fields.len() < 13 {
        return Err(ASCOMError::driver_error(
            "Did not receive correctly formatted status from switch",
        ));
    }
    let mut parsed = PowerBoxStatus {
        input_voltage: field(&fields, 1)?,
        temperature: field(&fields, 3)?,
        humidity: field(&fields, 4)?,
        dew_point: field(&fields, 5)?,
        quad_on: fields[6] == "1",
        adjustable_on: fields[7] == "1",
        dew_a_pwm: field(&fields, 8)?,
        dew_b_pwm: field(&fields, 9)?,
        auto_dew: fields[10] == "1",
        power_warning: fields[11] == "1",
        adjustable_voltage: field(&fields, 12)?,
        ..PowerBoxStatus::default()
    };

    let line = exchange_line(transport, "PC\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"PC") || fields.len() < 6 {
        return Err(ASCOMError::driver_error(
            "Did not receive correct data from the power metrics command",
        ));
    }
    parsed.total_current = field(&fields, 1)?;
    parsed.quad_current = field(&fields, 2)?;
    parsed.dew_a_current = field(&fields, 3)?;
    parsed.dew_b_current = field(&fields, 4)?;
    parsed.uptime_minutes = field::<f64>(&fields, 5)? / 60_000.0;

    let line = exchange_line(transport, "PS\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"PS") || fields.len() < 4 {
        return Err(ASCOMError::driver_error(
            "Did not receive correct data from the power consumption command",
        ));
    }
    parsed.power = field(&fields, 3)?;

    let line = exchange_line(transport, "DA\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"DA") || fields.len() < 2 {
        return Err(ASCOMError::driver_error(
            "Did not receive correct data from the dew aggressiveness command",
        ));
    }
    parsed.dew_aggressiveness = field(&fields, 1)?;

    let mut state = state.lock().expect("switch state poisoned");
    // No status line reports the USB2 ports; keep the tracked value.
    parsed.usb2_on = state.usb2_on;
    *state = parsed;
    Ok(())
}

impl PowerBoxSwitch {
    /// Creates a driver for the power box on the given serial device path.
    pub fn new(name: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_path: device_path.into(),
            state: Arc::new(Mutex::new(PowerBoxStatus::default())),
            connection: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let switch = Self::new("test switch", "/dev/null");
        *switch.connection.write().expect("connection lock poisoned") =
            Some(DeviceConnection::new(transport));
        switch
    }

    fn lock(&self) -> MutexGuard<'_, PowerBoxStatus> {
        self.state.lock().expect("switch state poisoned")
    }

    fn transport(&self) -> ASCOMResult<Arc<dyn Transport>> {
        self.connection
            .read()
            .expect("connection lock poisoned")
            .as_ref()
            .map(|connection| Arc::clone(&connection.transport))
            .ok_or(ASCOMError::NOT_CONNECTED)
    }

    fn ensure_connected(&self) -> ASCOMResult {
        self.transport().map(|_| ())
    }

    /// Sends a write command and verifies the firmware echo.
    async fn command_echo(&self, command: &str) -> ASCOMResult {
        let transport = self.transport()?;
        let echo = exchange_line(transport.as_ref(), &format!("{command}\n")).await?;
        if echo.trim_end() == command {
            Ok(())
        } else {
            Err(ASCOMError::driver_error(format_args!(
                "Switch echoed {echo:?} for {command:?}"
            )))
        }
    }

    fn ensure_writable(channel: Channel) -> ASCOMResult {
        if channel.writable() {
            Ok(())
        } else {
            Err(ASCOMError::invalid_operation(format_args!(
                "Switch {} doesn't support write",
                channel as i32
            )))
        }
    }

    async fn write_channel(&self, channel: Channel, value: f64) -> ASCOMResult {
        Self::ensure_writable(channel)?;
        let (min, max, _) = channel.bounds();
        if !(min..=max).contains(&value) {
            return Err(ASCOMError::invalid_value(format_args!(
                "Invalid value {value} for {}",
                channel.name()
            )));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = value.round() as u32;
        match channel {
            Channel::QuadOutput => {
                self.command_echo(&format!("P1:{}", u8::from(value > 0.0)))
                    .await?;
                self.lock().quad_on = value > 0.0;
            }
            Channel::AdjustableOutput => {
                self.command_echo(&format!("P2:{}", u8::from(value > 0.0)))
                    .await?;
                self.lock().adjustable_on = value > 0.0;
            }
            Channel::AdjustableVoltage => {
                // Round into the nearest selectable rail voltage.
                let bucket = ADJUSTABLE_VOLTAGES
                    .into_iter()
                    .min_by(|a, b| {
                        let da = (f64::from(*a) - value).abs();
                        let db = (f64::from(*b) - value).abs();
                        da.partial_cmp(&db)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(b.cmp(a))
                    })
                    .expect("voltage table is not empty");
                self.command_echo(&format!("P2:{bucket}")).await?;
                self.lock().adjustable_voltage = f64::from(bucket);
            }
            Channel::DewAPwm => {
                self.command_echo(&format!("P3:{whole}")).await?;
                self.lock().dew_a_pwm = f64::from(whole);
            }
            Channel::DewBPwm => {
                self.command_echo(&format!("P4:{whole}")).await?;
                self.lock().dew_b_pwm = f64::from(whole);
            }
            Channel::AutoDew => {
                self.command_echo(&format!("PD:{}", u8::from(value > 0.0)))
                    .await?;
                self.lock().auto_dew = value > 0.0;
            }
            Channel::DewAggressiveness => {
                self.command_echo(&format!("PD:{whole}")).await?;
                self.lock().dew_aggressiveness = f64::from(whole);
            }
            Channel::Usb2Ports => {
                self.command_echo(&format!("PU:{}", u8::from(value > 0.0)))
                    .await?;
                self.lock().usb2_on = value > 0.0;
            }
            _ => unreachable!("read-only channels are rejected above"),
        }
        Ok(())
    }
}

#[async_trait]
impl Device for PowerBoxSwitch {
    fn static_name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.device_path
    }

    async fn connected(&self) -> ASCOMResult<bool> {
        Ok(self
            .connection
            .read()
            .expect("connection lock poisoned")
            .is_some())
    }

    async fn set_connected(&self, connected: bool) -> ASCOMResult {
        if connected == self.connected().await? {
            tracing::warn!(connected, "set_connected called but already in that state");
            return Ok(());
        }

        if connected {
            let transport: Arc<dyn Transport> = Arc::new(
                SerialTransport::open(&self.device_path, SerialConfig::BAUD_9600).map_err(
                    |err| {
                        ASCOMError::driver_error(format_args!(
                            "Problem opening serial connection at {}: {err}",
                            self.device_path
                        ))
                    },
                )?,
            );
            let probe = exchange_line(transport.as_ref(), "P#\n").await?;
            tracing::debug!(probe, "Connected to power box");

            let connection = DeviceConnection::new(Arc::clone(&transport));
            {
                let state = Arc::clone(&self.state);
                connection.spawn_poller(POLL_INTERVAL, move || {
                    let transport = Arc::clone(&transport);
                    let state = Arc::clone(&state);
                    async move {
                        if let Err(err) = refresh(transport.as_ref(), &state).await {
                            tracing::warn!(%err, "Problem refreshing switch state");
                        }
                    }
                });
            }
            *self.connection.write().expect("connection lock poisoned") = Some(connection);
        } else {
            let connection = self
                .connection
                .write()
                .expect("connection lock poisoned")
                .take();
            if let Some(connection) = connection {
                connection.shutdown().await;
            }
            *self.lock() = PowerBoxStatus::default();
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Multi-channel power and dew controller".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " power box driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl Switch for PowerBoxSwitch {
    async fn max_switch(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(CHANNEL_COUNT)
    }

    async fn can_write(&self, id: i32) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.writable())
    }

    async fn get_switch(&self, id: i32) -> ASCOMResult<bool> {
        Ok(self.get_switch_value(id).await? > 0.0)
    }

    async fn get_switch_description(&self, id: i32) -> ASCOMResult<String> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.description().to_owned())
    }

    async fn get_switch_name(&self, id: i32) -> ASCOMResult<String> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.name().to_owned())
    }

    async fn get_switch_value(&self, id: i32) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        let channel = Channel::from_id(id)?;
        let status = *self.lock();
        Ok(match channel {
            Channel::InputVoltage => status.input_voltage,
            Channel::TotalCurrent => status.total_current,
            Channel::QuadCurrent => status.quad_current,
            Channel::Power => status.power,
            Channel::Temperature => status.temperature,
            Channel::Humidity => status.humidity,
            Channel::DewPoint => status.dew_point,
            Channel::QuadOutput => f64::from(status.quad_on),
            Channel::AdjustableOutput => f64::from(status.adjustable_on),
            Channel::AdjustableVoltage => status.adjustable_voltage,
            Channel::DewAPwm => status.dew_a_pwm,
            Channel::DewBPwm => status.dew_b_pwm,
            Channel::DewACurrent => status.dew_a_current,
            Channel::DewBCurrent => status.dew_b_current,
            Channel::AutoDew => f64::from(status.auto_dew),
            Channel::PowerWarning => f64::from(status.power_warning),
            Channel::Uptime => status.uptime_minutes,
            Channel::DewAggressiveness => status.dew_aggressiveness,
            Channel::Usb2Ports => f64::from(status.usb2_on),
        })
    }

    async fn min_switch_value(&self, id: i32) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.bounds().0)
    }

    async fn max_switch_value(&self, id: i32) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.bounds().1)
    }

    async fn switch_step(&self, id: i32) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(Channel::from_id(id)?.bounds().2)
    }

    async fn set_switch(&self, id: i32, state: bool) -> ASCOMResult {
        let channel = Channel::from_id(id)?;
        // Boolean writes drive PWM channels to their extremes.
        let value = match channel {
            Channel::DewAPwm | Channel::DewBPwm if state => 255.0,
            Channel::AdjustableVoltage if state => 12.0,
            Channel::AdjustableVoltage => 3.0,
            Channel::DewAggressiveness if state => 254.0,
            Channel::DewAggressiveness => 1.0,
            _ => f64::from(state),
        };
        self.write_channel(channel, value).await
    }

    async fn set_switch_value(&self, id: i32, value: f64) -> ASCOMResult {
        self.write_channel(Channel::from_id(id)?, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{Reply, ScriptedTransport};
    use crate::ASCOMErrorCode;

    const STATUS_SCRIPT: [(&[u8], &[u8]); 4] = [
        (b"PA\n", b"PPBA:12.2:0.5:22.2:45:17.2:1:1:120:130:1:0:3\n"),
        (b"PC\n", b"PC:3.1:1.2:0.4:0.5:600000\n"),
        (b"PS\n", b"PS:12.2:3.1:37.8\n"),
        (b"DA\n", b"DA:210\n"),
    ];

    fn switch_with(script: Vec<(&'static [u8], Reply)>) -> (PowerBoxSwitch, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let switch = PowerBoxSwitch::with_transport(Arc::<ScriptedTransport>::clone(&transport));
        (switch, transport)
    }

    async fn refreshed_switch() -> (PowerBoxSwitch, Arc<ScriptedTransport>) {
        let (switch, transport) = switch_with(
            STATUS_SCRIPT
                .into_iter()
                .map(|(cmd, reply)| (cmd, Reply::Bytes(reply)))
                .collect(),
        );
        refresh(transport.as_ref(), &switch.state).await.unwrap();
        (switch, transport)
    }

    #[tokio::test]
    async fn status_lines_populate_all_channels() {
        let (switch, transport) = refreshed_switch().await;
        assert!((switch.get_switch_value(0).await.unwrap() - 12.2).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(1).await.unwrap() - 3.1).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(3).await.unwrap() - 37.8).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(4).await.unwrap() - 22.2).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(5).await.unwrap() - 45.0).abs() < f64::EPSILON);
        assert!(switch.get_switch(7).await.unwrap());
        assert!((switch.get_switch_value(9).await.unwrap() - 3.0).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(10).await.unwrap() - 120.0).abs() < f64::EPSILON);
        assert!(!switch.get_switch(15).await.unwrap());
        assert!((switch.get_switch_value(16).await.unwrap() - 10.0).abs() < f64::EPSILON);
        assert!((switch.get_switch_value(17).await.unwrap() - 210.0).abs() < f64::EPSILON);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn read_only_channels_reject_writes() {
        let (switch, transport) = switch_with(vec![]);
        for id in [0, 1, 2, 3, 4, 5, 6, 12, 13, 15, 16] {
            let err = switch.set_switch_value(id, 1.0).await.unwrap_err();
            assert_eq!(err.code, ASCOMErrorCode::INVALID_OPERATION, "channel {id}");
        }
        transport.assert_drained();
    }

    #[tokio::test]
    async fn pwm_channel_accepts_full_range_and_verifies_echo() {
        let (switch, transport) = switch_with(vec![(
            b"P3:200\n".as_slice(),
            Reply::Bytes(b"P3:200\n"),
        )]);
        switch.set_switch_value(10, 200.0).await.unwrap();
        assert!((switch.get_switch_value(10).await.unwrap() - 200.0).abs() < f64::EPSILON);

        let err = switch.set_switch_value(10, 256.0).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn adjustable_voltage_rounds_into_buckets() {
        let (switch, transport) = switch_with(vec![
            (b"P2:8\n".as_slice(), Reply::Bytes(b"P2:8\n")),
            (b"P2:12\n".as_slice(), Reply::Bytes(b"P2:12\n")),
        ]);
        // 7.5 V rounds up into the 8 V bucket.
        switch.set_switch_value(9, 7.5).await.unwrap();
        assert!((switch.get_switch_value(9).await.unwrap() - 8.0).abs() < f64::EPSILON);
        switch.set_switch_value(9, 11.0).await.unwrap();

        // Below the lowest rail is refused outright.
        let err = switch.set_switch_value(9, 2.9).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn echo_mismatch_is_a_driver_error() {
        let (switch, transport) = switch_with(vec![(
            b"P1:1\n".as_slice(),
            Reply::Bytes(b"ERR\n"),
        )]);
        let err = switch.set_switch(7, true).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::DRIVER_ERROR);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn aggressiveness_bounds() {
        let (switch, transport) = switch_with(vec![(
            b"PD:128\n".as_slice(),
            Reply::Bytes(b"PD:128\n"),
        )]);
        switch.set_switch_value(17, 128.0).await.unwrap();
        for bad in [0.0, 255.0] {
            let err = switch.set_switch_value(17, bad).await.unwrap_err();
            assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        }
        transport.assert_drained();
    }

    #[tokio::test]
    async fn unknown_channel_is_invalid_value() {
        let (switch, transport) = switch_with(vec![]);
        let err = switch.get_switch_value(19).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        let err = switch.get_switch_name(-1).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        transport.assert_drained();
    }
}
