//! `SendSms`: a stub that pretends to send a text message.

use crate::tools::{ParamType, ToolArguments, ToolError, ToolRegistry, ToolSpec};

pub const NAME: &str = "SendSms";

pub fn spec() -> ToolSpec {
    ToolSpec::new(NAME, "Send an SMS message to a phone number")
        .param("message", ParamType::String, true, "The text of the message")
        .param(
            "phoneNumber",
            ParamType::String,
            true,
            "The phone number to send the message to",
        )
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(spec(), |args, _| send(args));
}

fn send(args: &ToolArguments) -> Result<String, ToolError> {
    let message = args.require_string("message")?;
    let phone = args.require_string("phoneNumber")?;
    tracing::info!(%phone, "sms sent");
    Ok(format!("SMS sent to {phone}: '{message}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::extract;

    #[test]
    fn formats_confirmation() {
        let args = extract(r#"{"message":"Order placed","phoneNumber":"555-0100"}"#).unwrap();
        assert_eq!(send(&args).unwrap(), "SMS sent to 555-0100: 'Order placed'");
    }

    #[test]
    fn requires_phone_number() {
        let args = extract(r#"{"message":"hi"}"#).unwrap();
        assert!(matches!(send(&args), Err(ToolError::InvalidInput(_))));
    }
}
