// Provisioning Module
// Validation of pairing requests and the JSON response returned to the app.
// Topic names are inverted at this boundary: the app's subscribe topic is
// where the device publishes, the app's publish topic is where it listens.

use heapless::String as FixedString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config_storage::{fit_text, Configuration};

// Request field names, in validation order
pub const FIELD_NETWORK_SSID: &str = "networkSsid";
pub const FIELD_NETWORK_PASSWORD: &str = "networkPassword";
pub const FIELD_BROKER_HOST: &str = "mqttHostName";
pub const FIELD_BROKER_USER: &str = "mqttUserName";
pub const FIELD_BROKER_PASSWORD: &str = "mqttUserPassword";
pub const FIELD_SUBSCRIBE_TOPIC: &str = "subscribeTopic";
pub const FIELD_PUBLISH_TOPIC: &str = "publishTopic";

pub const PAIRING_ACCEPTED: i32 = 0;
pub const PAIRING_REJECTED: i32 = -1;

// Pairing error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    NotAnObject,
    MissingField(&'static str),
    NotAString(&'static str),
    TooLong { field: &'static str, max: usize },
    AlreadyCommitting,
}

impl std::fmt::Display for PairingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingError::NotAnObject => write!(f, "Request payload is not a JSON object"),
            PairingError::MissingField(field) => {
                write!(f, "Field '{}' not found in request object", field)
            }
            PairingError::NotAString(field) => {
                write!(f, "Field '{}' in request object is not a string", field)
            }
            PairingError::TooLong { field, max } => write!(
                f,
                "Field '{}' in request object is too long (max {} bytes)",
                field, max
            ),
            PairingError::AlreadyCommitting => write!(f, "Pairing already in progress"),
        }
    }
}

impl std::error::Error for PairingError {}

fn text_field<const N: usize>(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<FixedString<N>, PairingError> {
    let value = object.get(field).ok_or(PairingError::MissingField(field))?;
    let text = value.as_str().ok_or(PairingError::NotAString(field))?;
    fit_text::<N>(text).map_err(|_| PairingError::TooLong { field, max: N })
}

/// Validate a pairing request and build the configuration it describes.
/// The first offending field, in wire order, aborts validation.
pub fn validate_request(request: &Value) -> Result<Configuration, PairingError> {
    let object = request.as_object().ok_or(PairingError::NotAnObject)?;

    let network_name = text_field(object, FIELD_NETWORK_SSID)?;
    let network_credential = text_field(object, FIELD_NETWORK_PASSWORD)?;
    let broker_host = text_field(object, FIELD_BROKER_HOST)?;
    let broker_user = text_field(object, FIELD_BROKER_USER)?;
    let broker_credential = text_field(object, FIELD_BROKER_PASSWORD)?;
    let outbound_topic = text_field(object, FIELD_SUBSCRIBE_TOPIC)?;
    let inbound_topic = text_field(object, FIELD_PUBLISH_TOPIC)?;

    Ok(Configuration {
        configured: true,
        force_pairing: false,
        network_name,
        network_credential,
        broker_host,
        broker_user,
        broker_credential,
        inbound_topic,
        outbound_topic,
        ..Configuration::initialize()
    })
}

/// Response body of the pairing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResponse {
    pub pairing_response: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_response_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_user_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_topic: Option<String>,
}

impl PairingResponse {
    /// Success: echo the accepted fields back in the app's vocabulary
    pub fn accepted(device_id: &str, config: &Configuration) -> Self {
        Self {
            pairing_response: PAIRING_ACCEPTED,
            pairing_response_detail: None,
            pairing_device_name: Some(device_id.to_string()),
            network_ssid: Some(config.network_name.to_string()),
            network_password: Some(config.network_credential.to_string()),
            mqtt_host_name: Some(config.broker_host.to_string()),
            mqtt_user_name: Some(config.broker_user.to_string()),
            mqtt_user_password: Some(config.broker_credential.to_string()),
            subscribe_topic: Some(config.outbound_topic.to_string()),
            publish_topic: Some(config.inbound_topic.to_string()),
        }
    }

    pub fn rejected(error: &PairingError) -> Self {
        Self {
            pairing_response: PAIRING_REJECTED,
            pairing_response_detail: Some(error.to_string()),
            pairing_device_name: None,
            network_ssid: None,
            network_password: None,
            mqtt_host_name: None,
            mqtt_user_name: None,
            mqtt_user_password: None,
            subscribe_topic: None,
            publish_topic: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.pairing_response == PAIRING_ACCEPTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Value {
        json!({
            "networkSsid": "lab",
            "networkPassword": "secret",
            "mqttHostName": "broker.local",
            "mqttUserName": "dev",
            "mqttUserPassword": "pw",
            "subscribeTopic": "A",
            "publishTopic": "B"
        })
    }

    #[test]
    fn accepted_request_inverts_topics() {
        let config = validate_request(&request()).unwrap();
        assert!(config.configured);
        assert!(config.is_valid());
        assert_eq!(config.inbound_topic.as_str(), "B");
        assert_eq!(config.outbound_topic.as_str(), "A");
    }

    #[test]
    fn first_missing_field_in_order_is_reported() {
        let mut body = request();
        let object = body.as_object_mut().unwrap();
        object.remove("mqttUserName");
        object.remove("publishTopic");
        assert_eq!(
            validate_request(&body),
            Err(PairingError::MissingField("mqttUserName"))
        );
    }

    #[test]
    fn non_string_and_oversized_fields_are_rejected() {
        let mut body = request();
        body["networkPassword"] = json!(42);
        assert_eq!(
            validate_request(&body),
            Err(PairingError::NotAString("networkPassword"))
        );

        let mut body = request();
        body["networkSsid"] = json!("s".repeat(33));
        let err = validate_request(&body).unwrap_err();
        assert_eq!(
            err,
            PairingError::TooLong {
                field: "networkSsid",
                max: 32
            }
        );
        assert_eq!(
            err.to_string(),
            "Field 'networkSsid' in request object is too long (max 32 bytes)"
        );
    }

    #[test]
    fn empty_strings_are_allowed() {
        let mut body = request();
        body["mqttUserName"] = json!("");
        body["mqttUserPassword"] = json!("");
        let config = validate_request(&body).unwrap();
        assert!(config.broker_user.is_empty());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert_eq!(validate_request(&Value::Null), Err(PairingError::NotAnObject));
        assert_eq!(validate_request(&json!([1, 2])), Err(PairingError::NotAnObject));
    }

    #[test]
    fn response_json_shapes() {
        let config = validate_request(&request()).unwrap();
        let accepted = serde_json::to_value(PairingResponse::accepted("bridge_0011", &config)).unwrap();
        assert_eq!(accepted["pairingResponse"], 0);
        assert_eq!(accepted["pairingDeviceName"], "bridge_0011");
        assert_eq!(accepted["subscribeTopic"], "A");
        assert_eq!(accepted["publishTopic"], "B");
        assert!(accepted.get("pairingResponseDetail").is_none());

        let rejected = serde_json::to_value(PairingResponse::rejected(&PairingError::MissingField(
            "networkSsid",
        )))
        .unwrap();
        assert_eq!(rejected["pairingResponse"], -1);
        assert_eq!(
            rejected["pairingResponseDetail"],
            "Field 'networkSsid' not found in request object"
        );
        assert!(rejected.get("networkSsid").is_none());
    }
}
