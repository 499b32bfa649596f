use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Resolves an input device by name, or the host default when no name is
/// given.
pub fn get_or_default_input(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("host: {:?}", host.id());

    match device_name {
        Some(target) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| anyhow::anyhow!("no input device named {:?}", target)),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("no default input device")),
    }
}

/// Resolves an output device by name, or the host default.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();

    match device_name {
        Some(target) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .ok_or_else(|| anyhow::anyhow!("no output device named {:?}", target)),
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device")),
    }
}

/// Checks whether an input device still answers for its configuration.
/// Used to re-verify the microphone after a transient suspension before an
/// error is raised to the user.
pub fn input_is_healthy(device: &Device) -> bool {
    match device.default_input_config() {
        Ok(config) => {
            tracing::debug!(
                "input device healthy: {}ch @ {}hz",
                config.channels(),
                config.sample_rate().0
            );
            true
        }
        Err(e) => {
            tracing::warn!("input device health check failed: {}", e);
            false
        }
    }
}

/// Lists input devices with their default configs, marking the host default.
pub fn describe_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut lines = Vec::new();
    for device in host.input_devices()? {
        let name = device.name()?;
        let config = device.default_input_config()?;
        let mut line = format!(
            " * {} ({}ch, {}hz)",
            name,
            config.channels(),
            config.sample_rate().0
        );
        if name == default_name {
            line.push_str(" [default]");
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}
