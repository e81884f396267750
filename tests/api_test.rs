use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use nadlan::domain::{GeoResult, Geocode};
use nadlan::import::{parse_listings, ColumnMapping};
use nadlan::infrastructure::{server, AppState};
use nadlan::services::catalog::Catalog;
use nadlan::services::classifier::Classifier;
use nadlan::services::query_service::QueryConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

const LISTINGS: &str = "\
id,address,price,description,transaction,rooms,neighbourhood,has_parking
H1,\"12 Herzl St, Haifa\",\"₪2,500,000\",Spacious apartment for sale,,5,Hadar,true
R1,\"5 Hanassi Ave, Haifa\",\"4,500\",Bright apartment with balcony,for rent,3,Hadar,false
R2,\"20 Moriah Blvd, Haifa\",\"5,200\",Renovated flat per month,,2,Carmel,true
T1,\"1 Dizengoff St, Tel Aviv\",\"7,000\",Studio for rent,,1,Center,
U1,Nowhere,?,Nice place,,,,
";

// Fixed coordinates instead of a live geocoder
struct TableGeocoder;

#[async_trait]
impl Geocode for TableGeocoder {
    async fn resolve(&self, address: &str) -> GeoResult {
        let (latitude, longitude) = match address {
            "12 Herzl St, Haifa" => (32.8184, 34.9885),
            "5 Hanassi Ave, Haifa" => (32.8050, 34.9800),
            "20 Moriah Blvd, Haifa" => (32.7940, 34.9896),
            "1 Dizengoff St, Tel Aviv" => (32.0853, 34.7818),
            _ => return GeoResult::Unresolved,
        };
        GeoResult::Resolved {
            latitude,
            longitude,
            confidence: 0.5,
            resolved_address: address.to_string(),
        }
    }
}

// Helper to create a test app
async fn setup_test_app() -> Router {
    let parsed = parse_listings(LISTINGS.as_bytes(), &ColumnMapping::default())
        .expect("Failed to parse listings");
    let catalog = Catalog::build(parsed.records, &TableGeocoder, &Classifier::default(), 2)
        .await
        .expect("Failed to build catalog")
        .with_parse_report(parsed.report);

    let state = AppState::new(Arc::new(catalog), QueryConfig::default());
    server::build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn search_request(payload: Value) -> Request<Body> {
    Request::builder()
        .uri("/api/listings/search")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

fn listing_ids(body: &Value) -> Vec<&str> {
    body["listings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["listing_id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_search_rentals_near_point() {
    let app = setup_test_app().await;

    let response = app
        .oneshot(search_request(json!({
            "transaction_type": "ForRent",
            "near": { "lat": 32.80, "lon": 34.99, "radius_km": 2 }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(listing_ids(&body), vec!["R2", "R1"]);
    assert_eq!(body["summary"]["total_matches"], 2);
    assert_eq!(body["summary"]["returned"], 2);
    assert_eq!(body["summary"]["unresolved"], 1);

    let first_distance = body["listings"][0]["distance_km"].as_f64().unwrap();
    let second_distance = body["listings"][1]["distance_km"].as_f64().unwrap();
    assert!(first_distance <= second_distance);
    assert!(second_distance <= 2.0);
    assert_eq!(body["price_stats"]["min"], 4500.0);
    assert_eq!(body["price_stats"]["max"], 5200.0);
}

#[tokio::test]
async fn test_search_validation_errors() {
    let app = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(search_request(json!({
            "near": { "lat": 32.80, "lon": 34.99, "radius_km": -1 }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["field"], "near.radius_km");

    let response = app
        .clone()
        .oneshot(search_request(json!({ "transaction_type": "Sold" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["field"], "transaction_type");

    let response = app
        .oneshot(search_request(json!({ "bedrooms": 3 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["field"], "bedrooms");
}

#[tokio::test]
async fn test_search_rejects_malformed_body() {
    let app = setup_test_app().await;

    for body in ["{\"limit\": 3", "not json", "[1, 2]"] {
        let req = Request::builder()
            .uri("/api/listings/search")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["field"], "request");
        assert!(json["error"].is_string());
    }

    // No body and no content type is a search without filters
    let req = Request::builder()
        .uri("/api/listings/search")
        .method("POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["summary"]["total_matches"], 5);
}

#[tokio::test]
async fn test_search_limits_and_filters() {
    let app = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(search_request(json!({ "limit": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(listing_ids(&body).is_empty());
    assert_eq!(body["summary"]["total_matches"], 5);
    assert_eq!(body["price_stats"], Value::Null);

    let response = app
        .clone()
        .oneshot(search_request(json!({ "text": "BALCONY" })))
        .await
        .unwrap();
    assert_eq!(listing_ids(&body_json(response).await), vec!["R1"]);

    let response = app
        .oneshot(search_request(json!({
            "max_price": 6000,
            "sort_by": "price_desc"
        })))
        .await
        .unwrap();
    assert_eq!(listing_ids(&body_json(response).await), vec!["R2", "R1"]);
}

#[tokio::test]
async fn test_search_attribute_filters() {
    let app = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(search_request(json!({
            "min_rooms": 3,
            "neighbourhoods": ["HADAR"],
            "has_parking": true
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(listing_ids(&body), vec!["H1"]);
    assert_eq!(body["listings"][0]["rooms"], "5");
    assert_eq!(body["listings"][0]["neighbourhood"], "Hadar");
    assert_eq!(body["listings"][0]["features"], json!(["parking"]));

    let response = app
        .clone()
        .oneshot(search_request(json!({
            "transaction_type": "ForRent",
            "has_parking": true
        })))
        .await
        .unwrap();
    assert_eq!(listing_ids(&body_json(response).await), vec!["R2"]);

    let response = app
        .clone()
        .oneshot(search_request(json!({ "min_rooms": 2.5 })))
        .await
        .unwrap();
    assert_eq!(listing_ids(&body_json(response).await), vec!["H1", "R1"]);

    let response = app
        .oneshot(search_request(json!({ "min_rooms": -1 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["field"], "min_rooms");
}

#[tokio::test]
async fn test_get_listing() {
    let app = setup_test_app().await;

    let req = Request::builder()
        .uri("/api/listings/H1")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["transaction_type"], "ForSale");
    assert_eq!(body["lat"], 32.8184);
    assert_eq!(body["price"], "₪2,500,000");

    let req = Request::builder()
        .uri("/api/listings/U1")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let body = body_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(body["lat"], Value::Null);
    assert_eq!(body["transaction_type"], "Unknown");

    let req = Request::builder()
        .uri("/api/listings/missing")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_summary_and_health() {
    let app = setup_test_app().await;

    let req = Request::builder()
        .uri("/api/summary")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["for_sale"], 1);
    assert_eq!(body["for_rent"], 3);
    assert_eq!(body["unknown"], 1);
    assert_eq!(body["stats"]["listings"], 5);
    assert_eq!(body["stats"]["unresolved"], 1);

    let req = Request::builder()
        .uri("/api/health")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["listings"], 5);
}
