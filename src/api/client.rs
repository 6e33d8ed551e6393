//! Backend operations exposed by the SDK.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::filter::{cached_fetch, FetchError};
use crate::api::transport::{issue, ApiRequest, Transport};
use crate::cache::entry::keys;
use crate::cache::store::SharedStore;

/// User config and app config fetched together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseData {
    pub user_config: Value,
    pub app_config: Value,
}

/// The SDK's backend client. Cheap to clone.
#[derive(Clone)]
pub struct SdkClient {
    transport: Arc<dyn Transport>,
    store: SharedStore,
}

impl SdkClient {
    pub fn new(transport: Arc<dyn Transport>, store: SharedStore) -> Self {
        Self { transport, store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Issue `request`, then resolve it through the cache slot `key`.
    async fn fetch(&self, request: ApiRequest, key: Option<&str>) -> Result<Value, FetchError> {
        let pending = issue(&self.transport, request);
        cached_fetch(&self.store, pending, key).await
    }

    /// Page templates for the current user. Cached.
    pub async fn user_config(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/userConfig", params), Some(keys::USER_CONFIG))
            .await
    }

    /// Application settings. Cached.
    pub async fn app_config(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/appConfig", params), Some(keys::APP_CONFIG))
            .await
    }

    /// Current user's profile. Cached.
    pub async fn user_info(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/userInfo", params), Some(keys::USER_INFO))
            .await
    }

    /// Authorization token. Cached.
    pub async fn authorization(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/authorization", params), Some(keys::TOKEN))
            .await
    }

    /// One-shot draw. Never cached.
    pub async fn lottery(&self, data: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::post("/lottery", data), None).await
    }

    /// The user's results list. Never cached.
    pub async fn prize_list(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/prizeList", params), None).await
    }

    /// JS-SDK signature config. Never cached.
    pub async fn jssdk_config(&self, params: Value) -> Result<Value, FetchError> {
        self.fetch(ApiRequest::get("/wxJsdk", params), None).await
    }

    /// User config and app config, fetched concurrently. Fails if either fails.
    pub async fn base_data(&self) -> Result<BaseData, FetchError> {
        let (user_config, app_config) = futures::try_join!(
            self.user_config(Value::Object(Default::default())),
            self.app_config(Value::Object(Default::default())),
        )?;
        Ok(BaseData {
            user_config,
            app_config,
        })
    }

    /// Authorize, then fetch the JS-SDK config. Errors are logged, not returned.
    pub async fn warm_up(&self) -> Option<Value> {
        let empty = || Value::Object(Default::default());

        if let Err(e) = self.authorization(empty()).await {
            warn!(error = %e, "Authorization failed");
            return None;
        }

        match self.jssdk_config(empty()).await {
            Ok(config) => {
                info!("JS-SDK config fetched");
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "JS-SDK config fetch failed");
                None
            }
        }
    }
}
