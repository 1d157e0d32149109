use std::sync::Arc;

use async_trait::async_trait;
use carline_core::config::SalesConfig;
use serde_json::{json, Map, Value};

use crate::catalog::{match_category, match_manufacturer};
use crate::tools::http::{json_headers, HttpBackend};
use crate::tools::{object_schema, optional_str, required_int, required_str, Tool, ToolError, ToolRegistry};

pub fn sales_registry(config: &SalesConfig) -> Result<ToolRegistry, ToolError> {
    let sales = Arc::new(HttpBackend::new(&config.api_base_url, config.timeout_secs, json_headers())?);
    let leasing =
        Arc::new(HttpBackend::new(&config.leasing_base_url, config.timeout_secs, json_headers())?);

    let mut registry = ToolRegistry::new();
    registry.register(CatalogListing {
        name: "get_first_hand_models",
        description: "List first-hand (previously owned, single owner) car models currently for sale.",
        service_type: "first_hand",
        path: "/api/shlomo/models",
        backend: sales.clone(),
    });
    registry.register(CatalogListing {
        name: "get_zero_km_cars",
        description: "List zero-kilometer cars: new cars offered at special prices.",
        service_type: "zero_km",
        path: "/api/shlomo/zero-km-cars",
        backend: sales.clone(),
    });
    registry.register(CatalogDetail {
        name: "get_first_hand_car_details",
        description: "Get full details for one first-hand model.",
        service_type: "first_hand_details",
        path: "/api/shlomo/first-hand-cars",
        key: "importer_model",
        backend: sales.clone(),
    });
    registry.register(CatalogDetail {
        name: "get_zero_km_car_details",
        description: "Get full details for one zero-kilometer car.",
        service_type: "zero_km_details",
        path: "/api/shlomo/zero-km-cars",
        key: "car_id",
        backend: sales,
    });
    registry.register(CatalogListing {
        name: "get_leasing_cars",
        description: "List cars available for operational leasing with their monthly payments.",
        service_type: "leasing",
        path: "/api/shlomo/leasing-cars",
        backend: leasing.clone(),
    });
    registry.register(CatalogDetail {
        name: "get_leasing_car_details",
        description: "Get full details for one leasing offer.",
        service_type: "leasing_details",
        path: "/api/shlomo/leasing-cars",
        key: "car_id",
        backend: leasing,
    });
    registry.register(CompareAndRecommend);
    Ok(registry)
}

fn service_context(service_type: &str) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("service_type".to_string(), Value::String(service_type.to_string()));
    context
}

/// GET on a fixed listing path, wrapped with its service type.
pub struct CatalogListing {
    name: &'static str,
    description: &'static str,
    service_type: &'static str,
    path: &'static str,
    backend: Arc<HttpBackend>,
}

#[async_trait]
impl Tool for CatalogListing {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn argument_schema(&self) -> Value {
        object_schema(json!({}), &[])
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        let data = self.backend.get_json(self.path).await?;
        Ok(json!({"service_type": self.service_type, "data": data}))
    }

    fn error_context(&self) -> Map<String, Value> {
        service_context(self.service_type)
    }
}

/// GET on `{path}/{id}` where the id comes from a single required argument.
pub struct CatalogDetail {
    name: &'static str,
    description: &'static str,
    service_type: &'static str,
    path: &'static str,
    key: &'static str,
    backend: Arc<HttpBackend>,
}

#[async_trait]
impl Tool for CatalogDetail {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn argument_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            self.key.to_string(),
            json!({"type": "string", "description": "Identifier taken from the listing results"}),
        );
        object_schema(Value::Object(properties), &[self.key])
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let id = required_str(&arguments, self.key)?;
        let path = format!("{}/{}", self.path, urlencoding::encode(&id));
        let data = self.backend.get_json(&path).await?;

        let mut body = service_context(self.service_type);
        body.insert("data".to_string(), data);
        body.insert(self.key.to_string(), Value::String(id));
        Ok(Value::Object(body))
    }

    fn error_context(&self) -> Map<String, Value> {
        service_context(self.service_type)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentPreference {
    Cash,
    Monthly,
    Any,
}

impl PaymentPreference {
    pub fn parse(value: Option<&str>) -> Result<Self, ToolError> {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            None | Some("") | Some("any") => Ok(Self::Any),
            Some("cash") => Ok(Self::Cash),
            Some("monthly") => Ok(Self::Monthly),
            Some(other) => Err(ToolError::InvalidArguments(format!(
                "`payment_preference` must be cash, monthly or any, got `{other}`"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Monthly => "monthly",
            Self::Any => "any",
        }
    }
}

/// Echoes the customer's criteria normalized against the sales catalog.
/// Ranking is left to the assistant.
pub struct CompareAndRecommend;

#[async_trait]
impl Tool for CompareAndRecommend {
    fn name(&self) -> &'static str {
        "compare_and_recommend"
    }

    fn description(&self) -> &'static str {
        "Compare offers across first-hand, zero-km and leasing for the customer's budget and preferences."
    }

    fn argument_schema(&self) -> Value {
        object_schema(
            json!({
                "user_budget": {"type": "integer", "description": "Budget in NIS"},
                "preferred_category": {"type": "string"},
                "preferred_manufacturer": {"type": "string"},
                "payment_preference": {"type": "string", "enum": ["cash", "monthly", "any"]}
            }),
            &["user_budget"],
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let budget = required_int(&arguments, "user_budget")?;
        let category = optional_str(&arguments, "preferred_category")?.unwrap_or_default();
        let manufacturer = optional_str(&arguments, "preferred_manufacturer")?.unwrap_or_default();
        let payment =
            PaymentPreference::parse(optional_str(&arguments, "payment_preference")?.as_deref())?;

        Ok(json!({
            "user_criteria": {
                "budget": budget,
                "category": category,
                "manufacturer": manufacturer,
                "payment_preference": payment.as_str(),
            },
            "matched_category": match_category(&category),
            "matched_manufacturer": match_manufacturer(&manufacturer),
            "analysis": "Based on your criteria, here are the best deals across our services:",
            "recommendations": [],
            "savings_potential": {},
        }))
    }

    fn error_context(&self) -> Map<String, Value> {
        service_context("comparison")
    }
}

#[cfg(test)]
mod tests {
    use carline_core::config::SalesConfig;
    use serde_json::json;

    use super::{sales_registry, PaymentPreference};
    use crate::tools::test_server::serve_once;
    use crate::tools::ToolError;

    fn config(base_url: &str) -> SalesConfig {
        SalesConfig {
            api_base_url: base_url.to_string(),
            leasing_base_url: base_url.to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn detail_not_found_is_an_error_object_with_service_type() {
        let server = serve_once(404, "Not Found", "car not found").await;
        let registry = sales_registry(&config(&server.base_url)).expect("registry");

        let value = registry.invoke("get_zero_km_car_details", json!({"car_id": "77"})).await;
        assert_eq!(value, json!({"error": "HTTP 404: car not found", "service_type": "zero_km_details"}));
        assert!(server.request().await.starts_with("GET /api/shlomo/zero-km-cars/77 "));
    }

    #[tokio::test]
    async fn listing_wraps_data_with_service_type() {
        let server = serve_once(200, "OK", r#"[{"model": "קורולה"}]"#).await;
        let registry = sales_registry(&config(&server.base_url)).expect("registry");

        let value = registry.invoke("get_leasing_cars", json!({})).await;
        assert_eq!(value, json!({"service_type": "leasing", "data": [{"model": "קורולה"}]}));
        assert!(server.request().await.starts_with("GET /api/shlomo/leasing-cars "));
    }

    #[tokio::test]
    async fn detail_path_segment_is_percent_encoded() {
        let server = serve_once(200, "OK", r#"{"price": 150000}"#).await;
        let registry = sales_registry(&config(&server.base_url)).expect("registry");

        let value = registry
            .invoke("get_first_hand_car_details", json!({"importer_model": "TOYOTA COROLLA/HV"}))
            .await;
        assert_eq!(value["service_type"], "first_hand_details");
        assert_eq!(value["importer_model"], "TOYOTA COROLLA/HV");
        assert_eq!(value["data"]["price"], 150000);
        assert!(server
            .request()
            .await
            .starts_with("GET /api/shlomo/first-hand-cars/TOYOTA%20COROLLA%2FHV "));
    }

    #[tokio::test]
    async fn missing_detail_id_is_rejected_before_any_request() {
        let registry = sales_registry(&config("http://127.0.0.1:9")).expect("registry");
        let value = registry.invoke("get_leasing_car_details", json!({})).await;
        assert_eq!(
            value,
            json!({"error": "invalid arguments: missing required argument `car_id`", "service_type": "leasing_details"})
        );
    }

    #[tokio::test]
    async fn comparison_normalizes_category_and_manufacturer() {
        let registry = sales_registry(&config("http://127.0.0.1:9")).expect("registry");
        let value = registry
            .invoke(
                "compare_and_recommend",
                json!({"user_budget": "150000", "preferred_category": "SUV", "preferred_manufacturer": "טויוטה"}),
            )
            .await;

        assert_eq!(value["user_criteria"]["budget"], 150000);
        assert_eq!(value["user_criteria"]["payment_preference"], "any");
        assert_eq!(value["matched_category"], "ג'יפונים/SUV");
        assert_eq!(value["matched_manufacturer"], "טויוטה");
        assert_eq!(value["recommendations"], json!([]));
        assert_eq!(value["savings_potential"], json!({}));
    }

    #[tokio::test]
    async fn comparison_rejects_unknown_payment_preference() {
        let registry = sales_registry(&config("http://127.0.0.1:9")).expect("registry");
        let value = registry
            .invoke("compare_and_recommend", json!({"user_budget": 90000, "payment_preference": "barter"}))
            .await;
        assert_eq!(value["service_type"], "comparison");
        assert!(value["error"].as_str().unwrap_or_default().starts_with("invalid arguments:"));
    }

    #[test]
    fn payment_preference_defaults_to_any() {
        assert_eq!(PaymentPreference::parse(None).expect("default"), PaymentPreference::Any);
        assert_eq!(PaymentPreference::parse(Some("Monthly")).expect("monthly"), PaymentPreference::Monthly);
        assert!(matches!(PaymentPreference::parse(Some("x")), Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn registry_exposes_seven_tools_in_order() {
        let registry = sales_registry(&config("https://sales.example")).expect("registry");
        assert_eq!(
            registry.names(),
            vec![
                "get_first_hand_models",
                "get_zero_km_cars",
                "get_first_hand_car_details",
                "get_zero_km_car_details",
                "get_leasing_cars",
                "get_leasing_car_details",
                "compare_and_recommend",
            ]
        );
    }
}
