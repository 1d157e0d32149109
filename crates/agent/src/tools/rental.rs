use std::sync::Arc;

use async_trait::async_trait;
use carline_core::config::RentalConfig;
use serde_json::{json, Value};

use crate::tools::http::{browser_headers, HttpBackend};
use crate::tools::{object_schema, required_int, required_str, Tool, ToolError, ToolRegistry};

pub const ALL_GROUPS_PATH: &str = "/api/v1/rent/all-groups";
pub const BRANCHES_PATH: &str = "/api/v1/rent/branches";
pub const ADDITIONS_PATH: &str = "/israel/additions";

pub fn rental_registry(config: &RentalConfig) -> Result<ToolRegistry, ToolError> {
    let backend = Arc::new(HttpBackend::new(
        &config.api_base_url,
        config.timeout_secs,
        browser_headers(&config.site_base_url)?,
    )?);

    let mut registry = ToolRegistry::new();
    registry.register(SearchAvailableCars {
        backend: backend.clone(),
        agreement: config.agreement.clone(),
        product: config.product,
    });
    registry.register(GetBranches { backend });
    registry.register(GeneratePurchaseLink {
        site_base_url: config.site_base_url.trim_end_matches('/').to_string(),
        agreement: config.agreement.clone(),
        product: config.product,
    });
    Ok(registry)
}

pub struct SearchAvailableCars {
    backend: Arc<HttpBackend>,
    agreement: String,
    product: u32,
}

#[async_trait]
impl Tool for SearchAvailableCars {
    fn name(&self) -> &'static str {
        "search_available_cars"
    }

    fn description(&self) -> &'static str {
        "Search for cars available to rent between two dates at the chosen pickup and return branches."
    }

    fn argument_schema(&self) -> Value {
        object_schema(
            json!({
                "fromDate": {"type": "string", "description": "Pickup date, DD/MM/YYYY"},
                "fromTime": {"type": "string", "description": "Pickup time, HH:MM"},
                "toDate": {"type": "string", "description": "Return date, DD/MM/YYYY"},
                "toTime": {"type": "string", "description": "Return time, HH:MM"},
                "pickupBranch": {"type": "integer", "description": "Pickup branch ID"},
                "returnBranch": {"type": "integer", "description": "Return branch ID"}
            }),
            &["fromDate", "fromTime", "toDate", "toTime", "pickupBranch", "returnBranch"],
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let payload = json!({
            "agreement": self.agreement,
            "fromDate": required_str(&arguments, "fromDate")?,
            "fromTime": required_str(&arguments, "fromTime")?,
            "toDate": required_str(&arguments, "toDate")?,
            "toTime": required_str(&arguments, "toTime")?,
            "pickupBranch": required_int(&arguments, "pickupBranch")?,
            "returnBranch": required_int(&arguments, "returnBranch")?,
            "isTourist": false,
            "product": self.product,
        });
        self.backend.post_json(ALL_GROUPS_PATH, &payload).await
    }
}

pub struct GetBranches {
    backend: Arc<HttpBackend>,
}

#[async_trait]
impl Tool for GetBranches {
    fn name(&self) -> &'static str {
        "get_branches"
    }

    fn description(&self) -> &'static str {
        "List the rental branches with their IDs and names."
    }

    fn argument_schema(&self) -> Value {
        object_schema(json!({}), &[])
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        self.backend.post_json(BRANCHES_PATH, &json!({})).await
    }
}

/// Builds the checkout link for a selected car group. No network access.
pub struct GeneratePurchaseLink {
    site_base_url: String,
    agreement: String,
    product: u32,
}

impl GeneratePurchaseLink {
    pub fn link(&self, arguments: &Value) -> Result<String, ToolError> {
        let text = |key: &str| required_str(arguments, key).map(|value| encode_query_value(&value));

        let pairs = [
            ("fromDate", text("fromDate")?),
            ("toDate", text("toDate")?),
            ("fromTime", text("fromTime")?),
            ("toTime", text("toTime")?),
            ("pickupBranch", required_int(arguments, "pickupBranch")?.to_string()),
            ("pickupBranchName", text("pickupBranchName")?),
            ("returnBranch", required_int(arguments, "returnBranch")?.to_string()),
            ("returnBranchName", text("returnBranchName")?),
            ("pickupBranchNameEn", text("pickupBranchNameEn")?),
            ("returnBranchNameEn", text("returnBranchNameEn")?),
            ("isIsraeliCitizen", "true".to_string()),
            ("minimumAge", "18".to_string()),
            ("carGroup", required_int(arguments, "carGroup")?.to_string()),
            ("product", self.product.to_string()),
            ("agreement", encode_query_value(&self.agreement)),
            ("countryCode", String::new()),
            ("currency", "NIS".to_string()),
            ("rentFromAirport", String::new()),
            ("flyCardElAl", String::new()),
            ("allowCoupons", String::new()),
            ("clientCode", String::new()),
            ("pickupCountry", String::new()),
            ("returnCountry", String::new()),
        ];

        let query =
            pairs.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("&");
        Ok(format!("{}{}?{}", self.site_base_url, ADDITIONS_PATH, query))
    }
}

#[async_trait]
impl Tool for GeneratePurchaseLink {
    fn name(&self) -> &'static str {
        "generate_purchase_link"
    }

    fn description(&self) -> &'static str {
        "Generate the checkout link for the car group the customer selected."
    }

    fn argument_schema(&self) -> Value {
        object_schema(
            json!({
                "fromDate": {"type": "string", "description": "Pickup date, DD/MM/YYYY"},
                "fromTime": {"type": "string", "description": "Pickup time, HH:MM"},
                "toDate": {"type": "string", "description": "Return date, DD/MM/YYYY"},
                "toTime": {"type": "string", "description": "Return time, HH:MM"},
                "pickupBranch": {"type": "integer"},
                "returnBranch": {"type": "integer"},
                "carGroup": {"type": "integer", "description": "groupCode of the selected car"},
                "pickupBranchName": {"type": "string", "description": "Hebrew branch name"},
                "returnBranchName": {"type": "string", "description": "Hebrew branch name"},
                "pickupBranchNameEn": {"type": "string"},
                "returnBranchNameEn": {"type": "string"}
            }),
            &[
                "fromDate",
                "fromTime",
                "toDate",
                "toTime",
                "pickupBranch",
                "returnBranch",
                "carGroup",
                "pickupBranchName",
                "returnBranchName",
                "pickupBranchNameEn",
                "returnBranchNameEn",
            ],
        )
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        self.link(&arguments).map(Value::String)
    }
}

/// Percent-encodes a query value, leaving `/` readable the way the site's own links do.
fn encode_query_value(value: &str) -> String {
    urlencoding::encode(value).replace("%2F", "/")
}
