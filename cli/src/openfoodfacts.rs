use anyhow::{Context, Result};

use larder_core::openfoodfacts::{NutritionFacts, SearchResponse, nutrition_from_search};
use larder_core::service::NutritionLookupProvider;

const SEARCH_URL: &str = "https://world.openfoodfacts.org/cgi/search.pl";

pub struct OpenFoodFactsClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
}

impl OpenFoodFactsClient {
    /// Must be called from inside a multi-threaded Tokio runtime.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt: tokio::runtime::Handle::current(),
        })
    }

    pub async fn lookup_nutrition_async(&self, name: &str) -> Result<Option<NutritionFacts>> {
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("search_terms", name),
                ("search_simple", "1"),
                ("json", "1"),
                ("page_size", "1"),
            ])
            .send()
            .await
            .context("Failed to reach OpenFoodFacts API")?
            .error_for_status()
            .context("OpenFoodFacts API returned an error")?;

        let data: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse OpenFoodFacts search response")?;

        Ok(nutrition_from_search(data))
    }
}

impl NutritionLookupProvider for OpenFoodFactsClient {
    fn lookup_nutrition(&self, name: &str) -> Result<Option<NutritionFacts>> {
        tracing::debug!(name, "Looking up nutrition on OpenFoodFacts");
        tokio::task::block_in_place(|| self.rt.block_on(self.lookup_nutrition_async(name)))
    }
}
