use crate::error::Result;
use kube::api::{Api, PostParams};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::info;

/// Outcome of an ensure pass for one resource
pub enum Ensured<K> {
    Created(K),
    Exists(K),
}

impl<K> Ensured<K> {
    /// The live object, whichever way it got there
    pub fn live(&self) -> &K {
        match self {
            Ensured::Created(k) | Ensured::Exists(k) => k,
        }
    }
}

/// Create-if-absent. Existing objects are returned untouched: desired
/// state is deterministic, so an object that exists under the expected
/// name is already the object we want (drift is not reconciled). A 409
/// from a racing create is resolved by re-reading.
pub async fn ensure<K>(api: &Api<K>, name: &str, desired: &K) -> Result<Ensured<K>>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    if let Some(existing) = api.get_opt(name).await? {
        return Ok(Ensured::Exists(existing));
    }

    match api.create(&PostParams::default(), desired).await {
        Ok(created) => {
            info!("Created {}", name);
            Ok(Ensured::Created(created))
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(Ensured::Exists(api.get(name).await?)),
        Err(e) => Err(e.into()),
    }
}
