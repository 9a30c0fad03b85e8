use api_contract::{error_codes, ApiResponse};

#[test]
fn success_envelope() {
    let response = ApiResponse::success(42u32);
    let json = serde_json::to_value(&response).expect("serialize");
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], 42);
    assert!(json["error"].is_null());
}

#[test]
fn error_envelope() {
    let response = ApiResponse::<()>::error(error_codes::AUTH_UNAUTHORIZED, "unauthorized");
    let json = serde_json::to_value(&response).expect("serialize");
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "AUTH.UNAUTHORIZED");
    assert_eq!(json["error"]["message"], "unauthorized");
}
