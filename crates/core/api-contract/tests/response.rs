use api_contract::ApiResponse;

#[test]
fn api_response_success() {
    let response = ApiResponse::success("ok");
    assert!(response.success);
    assert!(response.data.is_some());
    assert!(response.error.is_none());
}

#[test]
fn api_response_error() {
    let response = ApiResponse::<()>::error("DEVICE.NOT_FOUND", "device not found: rig-1");
    assert!(!response.success);
    assert!(response.data.is_none());
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(value["error"]["code"], "DEVICE.NOT_FOUND");
    assert!(value["error"].get("suggestion").is_none());
}

#[test]
fn api_response_error_carries_suggestion() {
    let response = ApiResponse::<()>::error_with_suggestion(
        "DEVICE.CONNECTION",
        "connection failed",
        "verify device is online and reachable",
    );
    let value = serde_json::to_value(&response).expect("serialize");
    assert_eq!(
        value["error"]["suggestion"],
        "verify device is online and reachable"
    );
}
