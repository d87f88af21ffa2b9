//! Integration tests for the retailer sources
//!
//! These tests use wiremock to stand in for the retailers and run each
//! source end-to-end through the coordinator into a SQLite database.

use rust_decimal::Decimal;
use serde_json::json;
use shelf_scout::config::{
    CarrefourConfig, CategoryEntry, Config, MercadonaConfig, OutputConfig, ScrapingConfig,
    UserAgentConfig,
};
use shelf_scout::{Coordinator, SourceTag, SqliteSink};
use std::str::FromStr;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with only the given sources enabled
fn create_test_config(
    db_path: &str,
    mercadona: Option<MercadonaConfig>,
    carrefour: Option<CarrefourConfig>,
) -> Config {
    Config {
        scraping: ScrapingConfig {
            batch_size: 2,
            timeout_secs: 5,
            retry_attempts: 0,
            category_delay_ms: 0,
            max_category_failures: 3,
        },
        user_agent: UserAgentConfig {
            name: "TestScout".to_string(),
            version: "1.0".to_string(),
            contact_email: "ops@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        mercadona,
        carrefour,
    }
}

fn mercadona_config(server: &MockServer) -> MercadonaConfig {
    MercadonaConfig {
        enabled: true,
        base_url: server.uri(),
        api_url: format!("{}/api", server.uri()),
        postal_code: "46001".to_string(),
    }
}

fn product(id: &str, name: &str, price: &str) -> serde_json::Value {
    json!({
        "id": id,
        "display_name": name,
        "thumbnail": format!("https://img.example.com/{}_300.jpg", id),
        "published": true,
        "price_instructions": {
            "unit_price": price,
            "reference_price": price,
            "reference_format": "€/kg"
        }
    })
}

async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_storefront(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>tienda</html>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_mercadona_full_run() {
    let server = MockServer::start().await;
    mount_storefront(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/postal-codes/actions/change-pc/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    mount_json(
        &server,
        "/api/categories/",
        json!({
            "count": 1,
            "results": [{
                "id": 1,
                "name": "Congelados",
                "categories": [
                    { "id": 10, "name": "Pescado" },
                    { "id": 11, "name": "Marisco" },
                    { "id": 12, "name": "Retirada" }
                ]
            }]
        }),
    )
    .await;

    mount_json(
        &server,
        "/api/categories/10/",
        json!({
            "id": 10,
            "name": "Pescado",
            "categories": [{
                "id": 100,
                "name": "Merluza",
                "products": [
                    product("501", "Merluza congelada", "4.15"),
                    product("502", "Gambón Hacendado", "6.95")
                ]
            }]
        }),
    )
    .await;

    mount_json(
        &server,
        "/api/categories/11/",
        json!({
            "id": 11,
            "name": "Marisco",
            "categories": [{
                "id": 110,
                "name": "Gambas",
                "products": [
                    product("502", "Gambón Hacendado", "6.95"),
                    product("503", "Mejillón cocido", "3.20"),
                    { "id": "504", "display_name": "Sin precio" }
                ]
            }]
        }),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/api/categories/12/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(SqliteSink::new(&dir.path().join("products.db")).unwrap());
    let config = create_test_config("unused.db", Some(mercadona_config(&server)), None);
    let coordinator = Coordinator::from_config(&config, sink.clone()).unwrap();

    let result = coordinator.run_one(SourceTag::Mercadona).await.unwrap();

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.found, 3);
    assert_eq!(result.inserted, 3);
    assert_eq!(result.errored, 0);

    let stored = sink.products_by_source(SourceTag::Mercadona, 10).unwrap();
    let ids: Vec<&str> = stored.iter().map(|r| r.item.external_id.as_str()).collect();
    assert_eq!(ids, vec!["501", "502", "503"]);

    let gambon = &stored[1].item;
    assert_eq!(gambon.category.as_deref(), Some("Congelados > Pescado > Merluza"));
    assert_eq!(gambon.subcategory.as_deref(), Some("Merluza"));
    assert_eq!(gambon.brand.as_deref(), Some("Hacendado"));
    assert_eq!(gambon.price, Decimal::from_str("6.95").unwrap());
    assert_eq!(gambon.unit.as_deref(), Some("kg"));
    assert_eq!(
        gambon.image_url.as_deref(),
        Some("https://img.example.com/502_600.jpg")
    );
}

#[tokio::test]
async fn test_mercadona_unreachable_storefront_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = create_test_config("unused.db", Some(mercadona_config(&server)), None);
    let sink = Arc::new(SqliteSink::new_in_memory().unwrap());
    let coordinator = Coordinator::from_config(&config, sink.clone()).unwrap();

    let result = coordinator.run_one(SourceTag::Mercadona).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.found, 0);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("Source unavailable"));
    assert_eq!(sink.count_total().unwrap(), 0);
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_mercadona_root_listing_failure_fails_run() {
    let server = MockServer::start().await;
    mount_storefront(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/categories/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = create_test_config("unused.db", Some(mercadona_config(&server)), None);
    let coordinator =
        Coordinator::from_config(&config, Arc::new(SqliteSink::new_in_memory().unwrap())).unwrap();

    let result = coordinator.run_one(SourceTag::Mercadona).await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.as_deref().unwrap().contains("HTTP 500"));
}

const BEBIDAS_PAGE: &str = r#"
<html><body>
  <div data-product-id="R-1">
    <a href="/p/agua/R-1"><img src="/img/1.jpg"></a>
    <p class="product-card__title">Agua mineral 1,5 L</p>
    <p class="product-card__price">0,35 €</p>
    <p class="product-card__price-per-unit">0,23 €/l</p>
  </div>
  <div data-product-id="R-2">
    <p class="product-card__title">Zumo de naranja</p>
    <p class="product-card__price">1,89 €</p>
  </div>
  <div data-product-id="R-3">
    <p class="product-card__title">Precio roto</p>
    <p class="product-card__price">consultar</p>
  </div>
</body></html>
"#;

#[tokio::test]
async fn test_carrefour_full_run() {
    let server = MockServer::start().await;
    mount_storefront(&server).await;

    Mock::given(method("GET"))
        .and(path("/supermercado/bebidas"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BEBIDAS_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/supermercado/agotado"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let carrefour = CarrefourConfig {
        enabled: true,
        base_url: server.uri(),
        categories: vec![
            CategoryEntry {
                name: "Bebidas".to_string(),
                path: "/supermercado/bebidas".to_string(),
            },
            CategoryEntry {
                name: "Agotado".to_string(),
                path: "/supermercado/agotado".to_string(),
            },
        ],
    };
    let config = create_test_config("unused.db", None, Some(carrefour));
    let sink = Arc::new(SqliteSink::new_in_memory().unwrap());
    let coordinator = Coordinator::from_config(&config, sink.clone()).unwrap();

    assert_eq!(coordinator.list_sources(), vec![SourceTag::Carrefour]);
    let results = coordinator.run_all().await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].found, 2);
    assert_eq!(results[0].inserted, 2);

    let stored = sink.products_by_source(SourceTag::Carrefour, 10).unwrap();
    let water = &stored[0].item;
    assert_eq!(water.external_id, "R-1");
    assert_eq!(water.category.as_deref(), Some("Bebidas"));
    assert_eq!(water.price_per_unit, Some(Decimal::from_str("0.23").unwrap()));
    assert_eq!(
        water.product_url.as_deref(),
        Some(format!("{}/p/agua/R-1", server.uri()).as_str())
    );
    assert_eq!(
        stored[1].item.product_url.as_deref(),
        Some(format!("{}/p/R-2", server.uri()).as_str())
    );
}
