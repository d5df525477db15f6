// src/price.rs
use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Pyth price feed ids.
pub const ETH_USD_FEED: &str = "0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace";
pub const USDC_USD_FEED: &str =
    "0xeaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a";

pub const FALLBACK_ETH_USD: Decimal = Decimal::from_parts(2000, 0, 0, false, 0);
pub const FALLBACK_USDC_USD: Decimal = Decimal::ONE;

/// Quotes older than this are flagged stale.
pub const MAX_PRICE_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Pyth API error: {0}")]
    Status(reqwest::StatusCode),
    #[error("{0} price not found")]
    Missing(&'static str),
    #[error("price {price}e{expo} is out of range")]
    OutOfRange { price: i64, expo: i32 },
}

/// Hermes sends 64-bit integers as JSON strings; older payloads use numbers.
fn int_from_string_or_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<i64> + TryFrom<u64>,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    let parsed = match Raw::deserialize(deserializer)? {
        Raw::Text(s) => return s.parse().map_err(serde::de::Error::custom),
        Raw::Signed(n) => T::try_from(n).ok(),
        Raw::Unsigned(n) => T::try_from(n).ok(),
    };
    parsed.ok_or_else(|| serde::de::Error::custom("integer out of range"))
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PriceData {
    #[serde(deserialize_with = "int_from_string_or_number")]
    pub price: i64,
    #[serde(deserialize_with = "int_from_string_or_number")]
    pub conf: u64,
    pub expo: i32,
    pub publish_time: i64,
}

fn scale(mantissa: i128, expo: i32) -> Option<Decimal> {
    if expo <= 0 {
        let m = i64::try_from(mantissa).ok()?;
        Decimal::try_new(m, expo.unsigned_abs()).ok()
    } else {
        let factor = 10i128.checked_pow(expo.unsigned_abs())?;
        Decimal::try_from_i128_with_scale(mantissa.checked_mul(factor)?, 0).ok()
    }
}

impl PriceData {
    /// `price × 10^expo`, exact.
    pub fn value(&self) -> Result<Decimal, PriceError> {
        scale(self.price as i128, self.expo).ok_or(PriceError::OutOfRange {
            price: self.price,
            expo: self.expo,
        })
    }

    pub fn confidence(&self) -> Result<Decimal, PriceError> {
        scale(self.conf as i128, self.expo).ok_or(PriceError::OutOfRange {
            price: self.price,
            expo: self.expo,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeed {
    pub id: String,
    pub price: PriceData,
    #[serde(default)]
    pub ema_price: Option<PriceData>,
}

/// Feed ids compare without `0x` and case; Hermes returns them bare.
pub fn normalize_feed_id(id: &str) -> String {
    id.trim_start_matches("0x").to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenPrices {
    #[serde(rename = "ETH")]
    pub eth: Decimal,
    #[serde(rename = "USDC")]
    pub usdc: Decimal,
}

impl TokenPrices {
    /// Prices from a feed map; each missing or malformed feed falls back on its own.
    pub fn from_feeds(feeds: &HashMap<String, PriceFeed>) -> Self {
        let pick = |feed_id: &str, fallback: Decimal| {
            feeds
                .get(&normalize_feed_id(feed_id))
                .and_then(|f| f.price.value().ok())
                .unwrap_or(fallback)
        };

        Self {
            eth: pick(ETH_USD_FEED, FALLBACK_ETH_USD),
            usdc: pick(USDC_USD_FEED, FALLBACK_USDC_USD),
        }
    }
}

/// One live feed with the context needed to judge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: &'static str,
    pub price: Decimal,
    pub ema_price: Option<Decimal>,
    pub confidence: ConfidenceInterval,
    pub publish_time: i64,
    pub stale: bool,
}

impl Quote {
    pub fn from_feed(
        symbol: &'static str,
        feed: &PriceFeed,
        now: i64,
        max_age: Duration,
    ) -> Result<Self, PriceError> {
        let price = feed.price.value()?;
        Ok(Self {
            symbol,
            price,
            ema_price: feed.ema_price.as_ref().and_then(|ema| ema.value().ok()),
            confidence: price_confidence(price, feed.price.confidence()?),
            publish_time: feed.price.publish_time,
            stale: is_price_stale(feed.price.publish_time, now, max_age),
        })
    }
}

/// Prices with fallbacks applied, plus quotes for the feeds that were live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub prices: TokenPrices,
    pub quotes: Vec<Quote>,
}

impl Default for TokenPrices {
    fn default() -> Self {
        Self {
            eth: FALLBACK_ETH_USD,
            usdc: FALLBACK_USDC_USD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PriceClient {
    client: Client,
    endpoint: String,
}

impl PriceClient {
    pub fn new(endpoint: &str) -> Result<Self, PriceError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Latest feeds keyed by normalized feed id.
    pub async fn fetch_prices(
        &self,
        ids: &[&str],
    ) -> Result<HashMap<String, PriceFeed>, PriceError> {
        let url = format!("{}/api/latest_price_feeds", self.endpoint);
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids[]", *id)).collect();

        let resp = self.client.get(&url).query(&query).send().await?;
        if !resp.status().is_success() {
            return Err(PriceError::Status(resp.status()));
        }

        let feeds: Vec<PriceFeed> = resp.json().await?;
        debug!("Fetched {} Pyth feeds from {}", feeds.len(), self.endpoint);

        Ok(feeds
            .into_iter()
            .map(|feed| (normalize_feed_id(&feed.id), feed))
            .collect())
    }

    async fn live_price(&self, feed_id: &str, label: &'static str) -> Result<Decimal, PriceError> {
        let feeds = self.fetch_prices(&[feed_id]).await?;
        feeds
            .get(&normalize_feed_id(feed_id))
            .ok_or(PriceError::Missing(label))?
            .price
            .value()
    }

    /// ETH/USD, or the fallback when the feed is unavailable.
    pub async fn eth_price(&self) -> Decimal {
        self.live_price(ETH_USD_FEED, "ETH").await.unwrap_or_else(|e| {
            warn!("Error getting ETH price: {}; using fallback", e);
            FALLBACK_ETH_USD
        })
    }

    /// USDC/USD, or the fallback when the feed is unavailable.
    pub async fn usdc_price(&self) -> Decimal {
        self.live_price(USDC_USD_FEED, "USDC").await.unwrap_or_else(|e| {
            warn!("Error getting USDC price: {}; using fallback", e);
            FALLBACK_USDC_USD
        })
    }

    /// Both prices in one request. Each missing feed falls back independently.
    pub async fn all_token_prices(&self) -> TokenPrices {
        match self.fetch_prices(&[ETH_USD_FEED, USDC_USD_FEED]).await {
            Ok(feeds) => TokenPrices::from_feeds(&feeds),
            Err(e) => {
                warn!("Error getting all token prices: {}; using fallbacks", e);
                TokenPrices::default()
            }
        }
    }

    /// Prices and quotes from a single Hermes request, judged for staleness at `now`.
    pub async fn snapshot(&self, now: i64) -> PriceSnapshot {
        let feeds = match self.fetch_prices(&[ETH_USD_FEED, USDC_USD_FEED]).await {
            Ok(feeds) => feeds,
            Err(e) => {
                warn!("Error getting price snapshot: {}; using fallbacks", e);
                return PriceSnapshot::default();
            }
        };

        let quotes = [("ETH", ETH_USD_FEED), ("USDC", USDC_USD_FEED)]
            .into_iter()
            .filter_map(|(symbol, feed_id)| {
                let feed = feeds.get(&normalize_feed_id(feed_id))?;
                Quote::from_feed(symbol, feed, now, MAX_PRICE_AGE)
                    .map_err(|e| warn!("Skipping {} quote: {}", symbol, e))
                    .ok()
            })
            .collect::<Vec<_>>();
        for quote in quotes.iter().filter(|q| q.stale) {
            warn!("{} price published at {} is stale", quote.symbol, quote.publish_time);
        }

        PriceSnapshot {
            prices: TokenPrices::from_feeds(&feeds),
            quotes,
        }
    }

    pub async fn eth_to_usd(&self, eth_amount: Decimal) -> Decimal {
        eth_amount * self.eth_price().await
    }

    pub async fn usdc_to_usd(&self, usdc_amount: Decimal) -> Decimal {
        usdc_amount * self.usdc_price().await
    }

    pub async fn usd_to_eth(&self, usd_amount: Decimal) -> Decimal {
        usd_amount
            .checked_div(self.eth_price().await)
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn usd_to_usdc(&self, usd_amount: Decimal) -> Decimal {
        usd_amount
            .checked_div(self.usdc_price().await)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Whether a feed published at `publish_time` is older than `max_age` at `now` (unix seconds).
pub fn is_price_stale(publish_time: i64, now: i64, max_age: Duration) -> bool {
    now - publish_time > max_age.as_secs() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfidenceInterval {
    pub lower: Decimal,
    pub upper: Decimal,
    pub percentage: Decimal,
}

pub fn price_confidence(price: Decimal, confidence: Decimal) -> ConfidenceInterval {
    let percentage = (confidence * Decimal::ONE_HUNDRED)
        .checked_div(price)
        .unwrap_or(Decimal::ZERO);
    ConfidenceInterval {
        lower: price - confidence,
        upper: price + confidence,
        percentage,
    }
}

/// `$1,234.50` style formatting with a fixed number of decimals.
pub fn format_usd(amount: Decimal, decimals: u32) -> String {
    let rounded = amount.round_dp(decimals);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let abs = rounded.abs();

    let text = format!("{:.*}", decimals as usize, abs);
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    match frac {
        Some(f) => format!("{sign}${grouped}.{f}"),
        None => format!("{sign}${grouped}"),
    }
}
