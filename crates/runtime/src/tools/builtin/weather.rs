//! `GetCurrentLocation` and `GetCurrentWeather` stubs.

use crate::tools::{ParamType, ToolArguments, ToolError, ToolRegistry, ToolSpec};

pub const LOCATION: &str = "GetCurrentLocation";
pub const WEATHER: &str = "GetCurrentWeather";

const UNITS: [&str; 2] = ["celsius", "fahrenheit"];

pub fn location_spec() -> ToolSpec {
    ToolSpec::new(LOCATION, "Get the user's current location")
}

pub fn weather_spec() -> ToolSpec {
    ToolSpec::new(WEATHER, "Get the current weather in a given location")
        .param(
            "location",
            ParamType::String,
            true,
            "The city and state, e.g. San Francisco, CA",
        )
        .enum_param("unit", &UNITS, false, "The temperature unit to use")
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(location_spec(), |_, _| Ok("San Francisco".into()));
    registry.register(weather_spec(), |args, _| current_weather(args));
}

fn current_weather(args: &ToolArguments) -> Result<String, ToolError> {
    let location = args.require_string("location")?;
    let unit = args.string("unit").unwrap_or_else(|| UNITS[0].to_string());
    if !UNITS.contains(&unit.as_str()) {
        return Err(ToolError::InvalidInput(format!("unknown unit `{unit}`")));
    }
    tracing::debug!(%location, %unit, "weather lookup");
    Ok(format!("31 {unit}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::extract;

    #[test]
    fn unit_defaults_to_celsius() {
        let args = extract(r#"{"location":"San Francisco"}"#).unwrap();
        assert_eq!(current_weather(&args).unwrap(), "31 celsius");
    }

    #[test]
    fn honours_requested_unit() {
        let args = extract(r#"{"location":"Boston, MA","unit":"fahrenheit"}"#).unwrap();
        assert_eq!(current_weather(&args).unwrap(), "31 fahrenheit");
    }

    #[test]
    fn rejects_unknown_unit() {
        let args = extract(r#"{"location":"Boston, MA","unit":"kelvin"}"#).unwrap();
        assert!(matches!(current_weather(&args), Err(ToolError::InvalidInput(_))));
    }

    #[test]
    fn location_stub() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        assert_eq!(registry.len(), 2);
        let handler = registry.resolve(LOCATION).unwrap();
        let ctx = crate::tools::ToolContext::new(
            tokio_util::sync::CancellationToken::new(),
            std::time::Duration::from_secs(1),
        );
        assert_eq!(handler(&ToolArguments::new(), &ctx).unwrap(), "San Francisco");
    }
}
