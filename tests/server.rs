//! End-to-end tests of the request pipeline, driven through the router
//! without sockets.

use alpaca_hub::drivers::{CameraFilterWheel, ControlPresentation, SdkCamera, SimulatedCamera};
use alpaca_hub::{Devices, Server, TypedDevice};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn hub_router() -> Router {
    let camera = SdkCamera::new(
        "Test camera",
        Arc::new(SimulatedCamera::default()),
        false,
        ControlPresentation::Index,
        ControlPresentation::Value,
    );
    let wheel = CameraFilterWheel::new(
        "Test wheel",
        camera.sdk_handle(),
        ["L", "R", "G", "B", "Ha"].map(str::to_owned).to_vec(),
        vec![0, 10, 10, 12, 40],
    )
    .unwrap();

    let mut devices = Devices::default();
    devices.register(TypedDevice::Camera(Arc::new(camera)));
    devices.register(TypedDevice::FilterWheel(Arc::new(wheel)));

    Server {
        devices,
        ..Server::default()
    }
    .into_router()
}

async fn send(router: &Router, method: Method, uri: &str, form: Option<&str>) -> (StatusCode, Vec<u8>) {
    send_with_accept(router, method, uri, form, None).await
}

async fn send_with_accept(
    router: &Router,
    method: Method,
    uri: &str,
    form: Option<&str>,
    accept: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    if form.is_some() {
        request = request.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    }
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    let request = request
        .body(form.map_or_else(Body::empty, |form| Body::from(form.to_owned())))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get_json(router: &Router, uri: &str) -> serde_json::Value {
    let (status, body) = send(router, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

async fn put_form(router: &Router, uri: &str, form: &str) -> serde_json::Value {
    let (status, body) = send(router, Method::PUT, uri, Some(form)).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn server_transaction_ids_increase_by_one() {
    let router = hub_router();
    let first = get_json(&router, "/api/v1/camera/0/connected?ClientTransactionID=42").await;
    let second = get_json(&router, "/api/v1/camera/0/connected?ClientTransactionID=42").await;

    assert_eq!(first["ClientTransactionID"], 42);
    assert_eq!(second["ClientTransactionID"], 42);
    assert_eq!(first["ErrorNumber"], 0);
    assert_eq!(
        second["ServerTransactionID"].as_u64().unwrap(),
        first["ServerTransactionID"].as_u64().unwrap() + 1
    );
}

#[tokio::test]
async fn client_id_is_echoed_and_malformed_ids_are_dropped() {
    let router = hub_router();
    let json = get_json(&router, "/api/v1/camera/0/connected?ClientID=7").await;
    assert_eq!(json["ClientID"], 7);

    let json = get_json(
        &router,
        "/api/v1/camera/0/connected?ClientTransactionID=banana",
    )
    .await;
    // Malformed transaction ids are a warning, not an error.
    assert_eq!(json["ErrorNumber"], 0);
    assert_eq!(json.get("ClientTransactionID"), None);
}

#[tokio::test]
async fn bad_device_identity_is_a_400() {
    let router = hub_router();

    let (status, body) = send(&router, Method::GET, "/api/v1/camera/99/name", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).starts_with("There is no camera at 99"));

    let (status, body) = send(&router, Method::GET, "/api/v1/dome/0/name", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).starts_with("Unsupported device_type: dome"));

    let (status, body) = send(&router, Method::GET, "/api/v1/camera/banana/name", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).starts_with("There is no camera at banana"));

    let (status, _) = send(&router, Method::GET, "/api/v1/camera/0/nosuchaction", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn domain_errors_stay_in_band_with_http_200() {
    let router = hub_router();
    // Not connected yet: a typed operation fails in the envelope, not at
    // the HTTP layer.
    let json = get_json(&router, "/api/v1/camera/0/binx").await;
    assert_eq!(json["ErrorNumber"], 0x407);
    assert_eq!(json.get("Value"), None);
    assert!(json["ErrorMessage"].as_str().unwrap().len() > 0);
}

#[tokio::test]
async fn boolean_literals_are_exact() {
    let router = hub_router();
    for bad in ["TRUE", "true", "1", "yes"] {
        let json = put_form(
            &router,
            "/api/v1/camera/0/connected",
            &format!("Connected={bad}"),
        )
        .await;
        assert_eq!(json["ErrorNumber"], 0x401, "literal {bad:?}");
    }
    // State is unchanged by the rejected writes.
    let json = get_json(&router, "/api/v1/camera/0/connected").await;
    assert_eq!(json["Value"], false);

    let json = put_form(&router, "/api/v1/camera/0/connected", "Connected=True").await;
    assert_eq!(json["ErrorNumber"], 0);
    let json = get_json(&router, "/api/v1/camera/0/connected").await;
    assert_eq!(json["Value"], true);
}

#[tokio::test]
async fn custom_command_paths_are_not_implemented() {
    let router = hub_router();
    for (action, form) in [
        ("action", "Action=foo&Parameters="),
        ("commandblind", "Command=foo&Raw=False"),
        ("commandbool", "Command=foo&Raw=False"),
        ("commandstring", "Command=foo&Raw=False"),
    ] {
        let json = put_form(&router, &format!("/api/v1/camera/0/{action}"), form).await;
        assert_eq!(json["ErrorNumber"], 0x400, "{action}");
    }

    let json = get_json(&router, "/api/v1/camera/0/supportedactions").await;
    assert_eq!(json["Value"], serde_json::json!([]));
}

#[tokio::test]
async fn management_api_describes_the_hub() {
    let router = hub_router();

    let json = get_json(&router, "/management/apiversions").await;
    assert_eq!(json["Value"], serde_json::json!([1]));

    let json = get_json(&router, "/management/v1/description").await;
    assert!(json["Value"]["ServerName"].is_string());
    assert!(json["Value"]["Manufacturer"].is_string());

    let json = get_json(&router, "/management/v1/configureddevices").await;
    let devices = json["Value"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["DeviceType"], "Camera");
    assert_eq!(devices[0]["DeviceNumber"], 0);
    assert_eq!(devices[0]["UniqueID"], "SIM-0001");
    assert_eq!(devices[1]["DeviceType"], "FilterWheel");
}

async fn prepare_exposed_frame(router: &Router) {
    let json = put_form(router, "/api/v1/camera/0/connected", "Connected=True").await;
    assert_eq!(json["ErrorNumber"], 0);
    for (action, form) in [
        ("numx", "NumX=4"),
        ("numy", "NumY=2"),
        ("startx", "StartX=0"),
        ("starty", "StartY=0"),
    ] {
        let json = put_form(router, &format!("/api/v1/camera/0/{action}"), form).await;
        assert_eq!(json["ErrorNumber"], 0);
    }

    let json = put_form(
        router,
        "/api/v1/camera/0/startexposure",
        "Duration=0.01&Light=True",
    )
    .await;
    assert_eq!(json["ErrorNumber"], 0);

    for _ in 0..400 {
        let json = get_json(router, "/api/v1/camera/0/imageready").await;
        if json["Value"] == true {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("image never became ready");
}

#[tokio::test]
async fn exposure_delivers_a_json_image_array() {
    let router = hub_router();
    prepare_exposed_frame(&router).await;

    let json = get_json(&router, "/api/v1/camera/0/imagearray").await;
    assert_eq!(json["ErrorNumber"], 0);
    assert_eq!(json["Type"], 2);
    assert_eq!(json["Rank"], 2);
    let grid = json["Value"].as_array().unwrap();
    assert_eq!(grid.len(), 4);
    for column in grid {
        let column = column.as_array().unwrap();
        assert_eq!(column.len(), 2);
        for sample in column {
            let sample = sample.as_i64().unwrap();
            assert!((0..=65535).contains(&sample));
        }
    }

    // The soft-deprecated alias answers too.
    let json = get_json(&router, "/api/v1/camera/0/imagearrayvariant").await;
    assert_eq!(json["Rank"], 2);
}

#[tokio::test]
async fn exposure_delivers_the_binary_envelope() {
    let router = hub_router();
    prepare_exposed_frame(&router).await;

    let (status, body) = send_with_accept(
        &router,
        Method::GET,
        "/api/v1/camera/0/imagearray?ClientTransactionID=9",
        None,
        Some("application/imagebytes"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 44 + 4 * 2 * 2);

    let dword = |offset: usize| i32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
    assert_eq!(dword(0), 1, "MetadataVersion");
    assert_eq!(dword(4), 0, "ErrorNumber");
    assert_eq!(dword(8), 9, "ClientTransactionID");
    assert_eq!(dword(16), 44, "DataStart");
    assert_eq!(dword(28), 2, "Rank");
    assert_eq!(dword(32), 4, "Dimension1");
    assert_eq!(dword(36), 2, "Dimension2");
    assert_eq!(dword(40), 0, "Dimension3");
}

#[tokio::test]
async fn filter_wheel_round_trip() {
    let router = hub_router();
    let json = put_form(&router, "/api/v1/filterwheel/0/connected", "Connected=True").await;
    assert_eq!(json["ErrorNumber"], 0);

    let json = get_json(&router, "/api/v1/filterwheel/0/names").await;
    assert_eq!(json["Value"].as_array().unwrap().len(), 5);
    let json = get_json(&router, "/api/v1/filterwheel/0/focusoffsets").await;
    assert_eq!(json["Value"].as_array().unwrap().len(), 5);

    let json = put_form(&router, "/api/v1/filterwheel/0/position", "Position=2").await;
    assert_eq!(json["ErrorNumber"], 0);
    for _ in 0..100 {
        let json = get_json(&router, "/api/v1/filterwheel/0/position").await;
        if json["Value"] == 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("wheel never reported the new position");

}

#[tokio::test]
async fn filter_wheel_rejects_unknown_slots() {
    let router = hub_router();
    let json = put_form(&router, "/api/v1/filterwheel/0/connected", "Connected=True").await;
    assert_eq!(json["ErrorNumber"], 0);
    let json = put_form(&router, "/api/v1/filterwheel/0/position", "Position=9").await;
    assert_eq!(json["ErrorNumber"], 0x401);
}

#[tokio::test]
async fn exposure_duration_bounds_surface_invalid_value() {
    let router = hub_router();
    let json = put_form(&router, "/api/v1/camera/0/connected", "Connected=True").await;
    assert_eq!(json["ErrorNumber"], 0);

    let json = put_form(
        &router,
        "/api/v1/camera/0/startexposure",
        "Duration=0.0000001&Light=True",
    )
    .await;
    assert_eq!(json["ErrorNumber"], 0x401);

    let json = put_form(
        &router,
        "/api/v1/camera/0/startexposure",
        "Duration=banana&Light=True",
    )
    .await;
    assert_eq!(json["ErrorNumber"], 0x401);
}
