use async_trait::async_trait;
use chrono::DateTime;
use futures::future::join_all;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use crate::core::context::RequestContext;
use crate::core::error::{MarketError, Result};
use crate::core::quote::{
    HistoryPoint, MarketDataProvider, Quote, SymbolMatch, normalize_symbol, percent_change,
};

/// Yahoo blocks requests carrying default HTTP client signatures.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";

/// The endpoints a single quote can be read from, in the order they are tried.
///
/// The quote endpoint is cheap and carries richer fields but is rate limited
/// and returns nothing for some symbols; the chart endpoint is heavier but
/// answers for nearly everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteSource {
    QuoteEndpoint,
    ChartEndpoint,
}

const QUOTE_SOURCES: [QuoteSource; 2] = [QuoteSource::QuoteEndpoint, QuoteSource::ChartEndpoint];

// Quote endpoint schema

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YahooQuoteResponse {
    quote_response: QuoteResult,
}

#[derive(Deserialize, Debug)]
struct QuoteResult {
    #[serde(default)]
    result: Vec<QuoteItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    symbol: String,
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
}

impl From<QuoteItem> for Quote {
    fn from(item: QuoteItem) -> Self {
        let price = item.regular_market_price.unwrap_or_default();
        let open = item.regular_market_open.unwrap_or_default();
        let change_pct = if price > 0.0 {
            percent_change(price, open)
        } else {
            0.0
        };
        Quote {
            symbol: normalize_symbol(&item.symbol),
            name: item.short_name.or(item.long_name).unwrap_or_default(),
            price,
            change: item.regular_market_change.unwrap_or_default(),
            change_pct,
            volume: item.regular_market_volume.unwrap_or_default(),
            high: item.regular_market_day_high.unwrap_or_default(),
            low: item.regular_market_day_low.unwrap_or_default(),
        }
    }
}

// Chart endpoint schema

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: Option<String>,
    short_name: Option<String>,
    long_name: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    regular_market_previous_close: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Bars>,
}

/// Indicator series. Yahoo emits `null` for bars without trades.
#[derive(Deserialize, Debug, Default)]
struct Bars {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

impl ChartItem {
    fn bars(&self) -> Option<&Bars> {
        self.indicators.as_ref().and_then(|i| i.quote.first())
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

fn last_positive(series: &[Option<f64>]) -> Option<f64> {
    positive(series.last().copied().flatten())
}

/// Builds a quote out of a chart payload.
///
/// Price is the last close, else the metadata market price. The reference
/// ("open") price is the first positive of: regular market previous close,
/// previous close, chart previous close, first bar of the open series.
fn quote_from_chart(item: &ChartItem, requested: &str) -> Quote {
    let meta = &item.meta;
    let bars = item.bars();

    let price = bars
        .and_then(|b| last_positive(&b.close))
        .or(meta.regular_market_price)
        .unwrap_or_default();

    let open = positive(meta.regular_market_previous_close)
        .or(positive(meta.previous_close))
        .or(positive(meta.chart_previous_close))
        .or_else(|| bars.and_then(|b| positive(b.open.first().copied().flatten())))
        .unwrap_or_default();

    let high = positive(meta.regular_market_day_high)
        .or_else(|| bars.and_then(|b| last_positive(&b.high)))
        .unwrap_or_default();
    let low = positive(meta.regular_market_day_low)
        .or_else(|| bars.and_then(|b| last_positive(&b.low)))
        .unwrap_or_default();
    let volume = meta
        .regular_market_volume
        .filter(|v| *v > 0)
        .or_else(|| bars.and_then(|b| b.volume.last().copied().flatten()))
        .unwrap_or_default();

    let change = if open > 0.0 { price - open } else { 0.0 };

    Quote {
        symbol: normalize_symbol(meta.symbol.as_deref().unwrap_or(requested)),
        name: meta
            .short_name
            .clone()
            .or_else(|| meta.long_name.clone())
            .unwrap_or_default(),
        price,
        change,
        change_pct: percent_change(price, open),
        volume,
        high,
        low,
    }
}

/// Pairs timestamps with closes by index. Trailing timestamps without a close
/// are dropped; a null close or a missing volume becomes 0.
fn history_from_chart(item: &ChartItem) -> Vec<HistoryPoint> {
    let (Some(timestamps), Some(bars)) = (item.timestamp.as_ref(), item.bars()) else {
        return Vec::new();
    };

    timestamps
        .iter()
        .zip(bars.close.iter())
        .enumerate()
        .filter_map(|(i, (ts, close))| {
            let close = close.unwrap_or_default();
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            let volume = bars.volume.get(i).copied().flatten().unwrap_or(0);
            Some(HistoryPoint {
                date,
                close,
                volume,
            })
        })
        .collect()
}

// Search endpoint schema

#[derive(Deserialize, Debug)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<SearchItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    #[serde(default)]
    symbol: String,
    #[serde(rename = "shortname")]
    short_name: Option<String>,
    #[serde(rename = "longname")]
    long_name: Option<String>,
    regular_market_price: Option<f64>,
}

/// Client for the public Yahoo Finance JSON endpoints.
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| MarketError::InvalidInput(format!("bad base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| MarketError::InvalidInput(format!("bad base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GETs `url` within `ctx` and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, ctx: &RequestContext, url: Url) -> Result<T> {
        debug!("Requesting {}", url);
        ctx.run(async {
            let response = self.client.get(url.clone()).send().await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(MarketError::NotFound(format!("{} returned 404", url.path())));
            }
            if !status.is_success() {
                return Err(MarketError::TransientUpstream(format!(
                    "HTTP error: {} for {}",
                    status,
                    url.path()
                )));
            }

            let text = response.text().await?;
            serde_json::from_str(&text).map_err(|e| {
                error!(error = ?e, url = %url, "Failed to parse Yahoo response");
                MarketError::TransientUpstream(format!(
                    "Failed to parse response from {}: {}",
                    url.path(),
                    e
                ))
            })
        })
        .await
    }

    async fn fetch_chart(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartItem> {
        let url = self.endpoint(
            &["v8", "finance", "chart", symbol],
            &[("range", range), ("interval", interval)],
        )?;
        let data: YahooChartResponse = self.get_json(ctx, url).await?;
        data.chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| MarketError::NotFound(format!("No chart data found for symbol: {symbol}")))
    }

    /// Batched read of the quote endpoint. An empty result is reported as
    /// `NotFound` so callers treat it like any other miss.
    async fn quotes_from_quote_endpoint(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> Result<Vec<Quote>> {
        let joined = symbols.join(",");
        let url = self.endpoint(&["v7", "finance", "quote"], &[("symbols", &joined)])?;
        let data: YahooQuoteResponse = self.get_json(ctx, url).await?;
        if data.quote_response.result.is_empty() {
            return Err(MarketError::NotFound(format!(
                "No quote data found for symbols: {joined}"
            )));
        }
        Ok(data
            .quote_response
            .result
            .into_iter()
            .map(Quote::from)
            .collect())
    }

    async fn quote_from_chart_endpoint(&self, ctx: &RequestContext, symbol: &str) -> Result<Quote> {
        let item = self.fetch_chart(ctx, symbol, "1d", "1d").await?;
        Ok(quote_from_chart(&item, symbol))
    }

    async fn quote_from(
        &self,
        source: QuoteSource,
        ctx: &RequestContext,
        symbol: &str,
    ) -> Result<Quote> {
        match source {
            QuoteSource::QuoteEndpoint => {
                let quotes = self
                    .quotes_from_quote_endpoint(ctx, &[symbol.to_string()])
                    .await?;
                let position = quotes
                    .iter()
                    .position(|q| q.symbol.eq_ignore_ascii_case(symbol))
                    .unwrap_or(0);
                quotes.into_iter().nth(position).ok_or_else(|| {
                    MarketError::NotFound(format!("No quote data found for symbol: {symbol}"))
                })
            }
            QuoteSource::ChartEndpoint => self.quote_from_chart_endpoint(ctx, symbol).await,
        }
    }
}

/// Reduces the failures of every tier into the error reported to the caller:
/// `NotFound` only when the last tier positively said so, otherwise transient.
fn combine_failures(symbol: &str, failures: Vec<(QuoteSource, MarketError)>) -> MarketError {
    match failures.last() {
        None => MarketError::TransientUpstream(format!("no quote source tried for {symbol}")),
        Some((_, MarketError::NotFound(_))) => {
            MarketError::NotFound(format!("symbol not found: {symbol}"))
        }
        Some((_, last)) if failures.len() == 1 => last.clone(),
        Some(_) => {
            let detail = failures
                .iter()
                .map(|(source, e)| format!("{source:?}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            MarketError::TransientUpstream(format!("all quote sources failed for {symbol} ({detail})"))
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    #[instrument(name = "YahooQuoteFetch", skip(self, ctx), fields(symbol = %symbol))]
    async fn fetch_quote(&self, ctx: &RequestContext, symbol: &str) -> Result<Quote> {
        let symbol = &normalize_symbol(symbol);
        let mut failures = Vec::new();

        for source in QUOTE_SOURCES {
            if ctx.is_done() && !failures.is_empty() {
                break;
            }
            match self.quote_from(source, ctx, symbol).await {
                Ok(quote) => {
                    if !failures.is_empty() {
                        debug!(?source, "Quote served by fallback source");
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    warn!(?source, error = %e, "Quote source failed");
                    failures.push((source, e));
                }
            }
        }

        Err(combine_failures(symbol, failures))
    }

    #[instrument(name = "YahooQuotesFetch", skip(self, ctx), fields(count = symbols.len()))]
    async fn fetch_quotes(&self, ctx: &RequestContext, symbols: &[String]) -> Result<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let symbols: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        let symbols = symbols.as_slice();

        match self.quotes_from_quote_endpoint(ctx, symbols).await {
            Ok(quotes) => return Ok(quotes),
            Err(e) if ctx.is_done() => return Err(e),
            Err(e) => warn!(error = %e, "Batched quote request failed, falling back per symbol"),
        }

        // Independent per-symbol fallbacks share the caller's deadline; dropping
        // this future cancels every request still in flight.
        let attempts = join_all(
            symbols
                .iter()
                .map(|symbol| self.quote_from_chart_endpoint(ctx, symbol)),
        )
        .await;

        let mut quotes = Vec::with_capacity(symbols.len());
        let mut first_error = None;
        for (symbol, attempt) in symbols.iter().zip(attempts) {
            match attempt {
                Ok(quote) => quotes.push(quote),
                Err(e) => {
                    debug!(%symbol, error = %e, "Dropping symbol after failed fallback");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if quotes.is_empty() => Err(e),
            _ => Ok(quotes),
        }
    }

    #[instrument(name = "YahooHistoryFetch", skip(self, ctx), fields(symbol = %symbol))]
    async fn fetch_history(
        &self,
        ctx: &RequestContext,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<Vec<HistoryPoint>> {
        let item = self.fetch_chart(ctx, symbol, range, interval).await?;
        if item.bars().is_none() {
            return Err(MarketError::NotFound(format!(
                "No quote data for symbol: {symbol}"
            )));
        }
        Ok(history_from_chart(&item))
    }

    #[instrument(name = "YahooSearch", skip(self, ctx), fields(query = %query))]
    async fn search_symbols(
        &self,
        ctx: &RequestContext,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SymbolMatch>> {
        let limit = limit.to_string();
        let url = self.endpoint(
            &["v1", "finance", "search"],
            &[("q", query), ("quotesCount", &limit)],
        )?;
        let data: YahooSearchResponse = self.get_json(ctx, url).await?;

        Ok(data
            .quotes
            .into_iter()
            .filter(|q| !q.symbol.is_empty() && q.symbol != "-")
            .map(|q| SymbolMatch {
                symbol: q.symbol,
                name: q.short_name.or(q.long_name).unwrap_or_default(),
                price: q.regular_market_price.unwrap_or_default(),
            })
            .collect())
    }
}
