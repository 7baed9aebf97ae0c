//! Models persisted through the tracking store.
//!
//! A model is any serde-serializable type implementing [`Model`]. Its bytes are
//! produced by a [`Flavor`]: `json` is readable by anything, `postcard` is the
//! compact binary form. Each model type names its native flavor, which the saver
//! uses when no flavor is requested.

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// A serialization format for model artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Json,
    Postcard,
}

impl Flavor {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Postcard => "postcard",
        }
    }

    /// File the payload is stored in, inside the artifact directory.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Json => "model.json",
            Self::Postcard => "model.bin",
        }
    }

    /// # Errors
    /// Returns an error if `model` cannot be serialized.
    pub fn encode<M: Serialize>(self, model: &M) -> Result<Vec<u8>> {
        match self {
            Self::Json => serde_json::to_vec_pretty(model).context("encode model as JSON"),
            Self::Postcard => postcard::to_allocvec(model).context("encode model with postcard"),
        }
    }

    /// # Errors
    /// Returns an error if `bytes` is not a valid encoding of `M`.
    pub fn decode<M: DeserializeOwned>(self, bytes: &[u8]) -> Result<M> {
        match self {
            Self::Json => serde_json::from_slice(bytes).context("decode JSON model"),
            Self::Postcard => postcard::from_bytes(bytes).context("decode postcard model"),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that can be logged to and loaded from the tracking store.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn native_flavor() -> Flavor {
        Flavor::Json
    }
}

/// `y = intercept + coefficients · x`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Ordinary least squares on a single feature.
    ///
    /// # Errors
    /// Fails if `x` and `y` differ in length, hold fewer than two points, or `x`
    /// is constant.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            bail!("x has {} values but y has {}", x.len(), y.len());
        }
        if x.len() < 2 {
            bail!("need at least two points to fit a line");
        }
        let n = x.len() as f64;
        let mean_x = x.iter().sum::<f64>() / n;
        let mean_y = y.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (xi, yi) in x.iter().zip(y) {
            sxy += (xi - mean_x) * (yi - mean_y);
            sxx += (xi - mean_x) * (xi - mean_x);
        }
        if sxx == 0.0 {
            bail!("x is constant; slope is undefined");
        }
        let slope = sxy / sxx;
        Ok(Self {
            coefficients: vec![slope],
            intercept: mean_y - slope * mean_x,
        })
    }

    /// Predict one row of features.
    #[must_use]
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, f)| c * f)
                .sum::<f64>()
    }

    /// Predict a single-feature input.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|xi| self.predict_row(&[*xi])).collect()
    }
}

impl Model for LinearModel {
    fn native_flavor() -> Flavor {
        Flavor::Postcard
    }
}
