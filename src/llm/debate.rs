//! Bull -> Bear -> Risk debate orchestrator. No orchestrator module
//! survived distillation into the original sources; the three-agent
//! sequential-call shape and fallback-on-any-failure idiom follow the
//! teacher's catch-at-the-boundary convention in `tools/fetch.rs` and the
//! batch-failure-isolation pattern of `market_data.py`'s
//! `fetch_batch_ohlcv`.

use std::time::Instant;

use serde::Deserialize;

use crate::domain::{
    AgentResponse, AgentRole, GreeksCited, MarketContext, SignalDirection, TradeThesis, FALLBACK_MODEL_NAME,
};
use crate::llm::client::LlmClient;
use crate::ports::ChatMessage;
use crate::scoring::determine_direction;

pub const DISCLAIMER_TEXT: &str =
    "This analysis is generated for informational purposes only and is not investment advice. \
     Options trading involves substantial risk of loss and is not suitable for every investor.";

#[derive(Debug, Deserialize)]
struct AgentPayload {
    analysis: String,
    #[serde(default)]
    key_points: Vec<String>,
    conviction: f64,
    #[serde(default)]
    contracts_referenced: Vec<String>,
    #[serde(default)]
    greeks_cited: GreeksCited,
}

#[derive(Debug, Deserialize)]
struct ThesisPayload {
    direction: String,
    conviction: f64,
    entry_rationale: String,
    #[serde(default)]
    risk_factors: Vec<String>,
    recommended_action: String,
}

fn parse_direction(raw: &str) -> Option<SignalDirection> {
    match raw.to_ascii_lowercase().as_str() {
        "bullish" => Some(SignalDirection::Bullish),
        "bearish" => Some(SignalDirection::Bearish),
        "neutral" => Some(SignalDirection::Neutral),
        _ => None,
    }
}

fn direction_label(direction: SignalDirection) -> &'static str {
    match direction {
        SignalDirection::Bullish => "bullish",
        SignalDirection::Bearish => "bearish",
        SignalDirection::Neutral => "neutral",
    }
}

fn bull_prompt(context: &MarketContext) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: "You are the bull analyst in an options trading debate. Respond only with \
                      JSON: {analysis, key_points, conviction, contracts_referenced, greeks_cited}."
                .to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!(
                "Ticker {} at {}. IV rank {:.1}, RSI {:.1}, put/call ratio {:.2}. Make the bull case.",
                context.ticker, context.current_price, context.iv_rank, context.rsi_14, context.put_call_ratio
            ),
        },
    ]
}

fn bear_prompt(context: &MarketContext, bull: &AgentResponse) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: "You are the bear analyst in an options trading debate. Respond only with \
                      JSON: {analysis, key_points, conviction, contracts_referenced, greeks_cited}."
                .to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!(
                "Ticker {} at {}. The bull analyst argued: {}. Make the bear case.",
                context.ticker, context.current_price, bull.analysis
            ),
        },
    ]
}

fn risk_prompt(context: &MarketContext, bull: &AgentResponse, bear: &AgentResponse) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: "You are the risk manager synthesizing a trade thesis. Respond only with \
                      JSON: {direction, conviction, entry_rationale, risk_factors, \
                      recommended_action}. direction is one of bullish, bearish, neutral."
                .to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!(
                "Ticker {}. Bull case: {}. Bear case: {}. Synthesize a final thesis.",
                context.ticker, bull.analysis, bear.analysis
            ),
        },
    ]
}

fn clarification(original: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = original.to_vec();
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: "Your previous response was not valid JSON matching the requested schema. \
                  Respond again with only the JSON object, no prose."
            .to_string(),
    });
    messages
}

/// Calls `client.chat` with `messages`, retrying once with a clarification
/// message if the response fails to parse as `T` or fails `validate`.
async fn chat_and_parse<T>(
    client: &LlmClient,
    messages: &[ChatMessage],
    validate: impl Fn(&T) -> bool,
) -> Option<(T, u32, u32)>
where
    T: for<'de> Deserialize<'de>,
{
    for attempt in 0..2 {
        let sent = if attempt == 0 {
            messages.to_vec()
        } else {
            clarification(messages)
        };
        let Ok(completion) = client.chat(&sent).await else {
            return None;
        };
        if let Ok(parsed) = serde_json::from_str::<T>(&completion.content) {
            if validate(&parsed) {
                return Some((parsed, completion.input_tokens, completion.output_tokens));
            }
        }
    }
    None
}

/// Builds a deterministic thesis from data alone: no LLM call, direction
/// from `determine_direction`, conviction from the normalized composite
/// score, summaries from a template citing RSI/ADX.
fn fallback_thesis(
    context: &MarketContext,
    adx: f64,
    sma_alignment: f64,
    composite_score: f64,
    elapsed_ms: u64,
) -> TradeThesis {
    let direction = determine_direction(adx, context.rsi_14, sma_alignment);
    let conviction = (composite_score / 100.0).clamp(0.0, 1.0);

    TradeThesis::new(
        direction,
        conviction,
        format!(
            "Data-driven fallback for {}: RSI {:.1}, ADX {:.1}, IV rank {:.1} classify this as {}.",
            context.ticker,
            context.rsi_14,
            adx,
            context.iv_rank,
            direction_label(direction)
        ),
        vec!["Generated without LLM confirmation; treat conviction as a rough heuristic.".to_string()],
        "Review manually before acting".to_string(),
        "Bull case unavailable: LLM not reachable.".to_string(),
        "Bear case unavailable: LLM not reachable.".to_string(),
        FALLBACK_MODEL_NAME,
        0,
        elapsed_ms,
        DISCLAIMER_TEXT,
    )
    .expect("fallback thesis fields are always within range")
}

/// Runs the Bull -> Bear -> Risk chain over `context`, falling back to a
/// deterministic data-driven thesis if the model is unreachable, any stage
/// fails to produce valid JSON after one retry, or any transport error
/// propagates.
pub async fn run_debate(
    client: &LlmClient,
    context: &MarketContext,
    adx: f64,
    sma_alignment: f64,
    composite_score: f64,
) -> TradeThesis {
    let start = Instant::now();

    if !client.validate_model().await {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    }

    let mut total_tokens: u32 = 0;

    let bull_messages = bull_prompt(context);
    let Some((bull_payload, bull_in, bull_out)) =
        chat_and_parse::<AgentPayload>(client, &bull_messages, |p| (0.0..=1.0).contains(&p.conviction)).await
    else {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    };
    total_tokens += bull_in + bull_out;
    let Ok(bull) = AgentResponse::new(
        AgentRole::Bull,
        bull_payload.analysis,
        bull_payload.key_points,
        bull_payload.conviction,
        bull_payload.contracts_referenced,
        bull_payload.greeks_cited,
        "bull-agent",
        bull_in,
        bull_out,
    ) else {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    };

    let bear_messages = bear_prompt(context, &bull);
    let Some((bear_payload, bear_in, bear_out)) =
        chat_and_parse::<AgentPayload>(client, &bear_messages, |p| (0.0..=1.0).contains(&p.conviction)).await
    else {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    };
    total_tokens += bear_in + bear_out;
    let Ok(bear) = AgentResponse::new(
        AgentRole::Bear,
        bear_payload.analysis,
        bear_payload.key_points,
        bear_payload.conviction,
        bear_payload.contracts_referenced,
        bear_payload.greeks_cited,
        "bear-agent",
        bear_in,
        bear_out,
    ) else {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    };

    let risk_messages = risk_prompt(context, &bull, &bear);
    let Some((thesis_payload, risk_in, risk_out)) = chat_and_parse::<ThesisPayload>(client, &risk_messages, |p| {
        (0.0..=1.0).contains(&p.conviction) && parse_direction(&p.direction).is_some()
    })
    .await
    else {
        return fallback_thesis(context, adx, sma_alignment, composite_score, start.elapsed().as_millis() as u64);
    };
    total_tokens += risk_in + risk_out;

    let direction = parse_direction(&thesis_payload.direction).unwrap_or(SignalDirection::Neutral);
    let duration_ms = start.elapsed().as_millis() as u64;

    TradeThesis::new(
        direction,
        thesis_payload.conviction,
        thesis_payload.entry_rationale,
        thesis_payload.risk_factors,
        thesis_payload.recommended_action,
        bull.analysis,
        bear.analysis,
        client.model(),
        total_tokens,
        duration_ms,
        DISCLAIMER_TEXT,
    )
    .unwrap_or_else(|_| fallback_thesis(context, adx, sma_alignment, composite_score, duration_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::error::DomainError;
    use crate::llm::client::DEFAULT_MODEL;
    use crate::ports::{LlmTransport, RawChatCompletion};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct UnreachableTransport;

    #[async_trait]
    impl LlmTransport for UnreachableTransport {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _num_ctx: u32,
        ) -> Result<RawChatCompletion, DomainError> {
            Err(DomainError::DataSourceUnavailable {
                ticker: "*".to_string(),
                source_name: "ollama".to_string(),
                detail: "connection refused".to_string(),
                cause: None,
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Err(DomainError::DataSourceUnavailable {
                ticker: "*".to_string(),
                source_name: "ollama".to_string(),
                detail: "connection refused".to_string(),
                cause: None,
            })
        }
    }

    struct ScriptedTransport {
        responses: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            model: &str,
            _num_ctx: u32,
        ) -> Result<RawChatCompletion, DomainError> {
            let mut responses = self.responses.lock().unwrap();
            let content = if responses.is_empty() {
                "{}".to_string()
            } else {
                responses.remove(0)
            };
            Ok(RawChatCompletion {
                content,
                model: model.to_string(),
                input_tokens: 5,
                output_tokens: 5,
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, DomainError> {
            Ok(vec![DEFAULT_MODEL.to_string()])
        }
    }

    fn context() -> MarketContext {
        MarketContext {
            ticker: "AAPL".to_string(),
            current_price: dec!(190.0),
            week52_high: dec!(200.0),
            week52_low: dec!(150.0),
            iv_rank: 40.0,
            iv_percentile: 45.0,
            atm_iv_30d: 0.28,
            rsi_14: 62.0,
            macd_signal: 0.4,
            put_call_ratio: 0.9,
            next_earnings: None,
            dte_target: 45,
            target_strike: dec!(195.0),
            target_delta: 0.35,
            sector: "Technology".to_string(),
            data_timestamp_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn falls_back_when_model_unreachable() {
        let client = LlmClient::new(
            Arc::new(UnreachableTransport),
            LlmConfig {
                host: "http://localhost:11434".to_string(),
                model: DEFAULT_MODEL.to_string(),
                num_ctx: 8192,
                chat_timeout_seconds: 30,
            },
        );
        let thesis = run_debate(&client, &context(), 20.0, 0.8, 65.0).await;
        assert_eq!(thesis.model_used, FALLBACK_MODEL_NAME);
        assert_eq!(thesis.total_tokens, 0);
        assert!(!thesis.disclaimer.is_empty());
    }

    #[tokio::test]
    async fn falls_back_on_malformed_json_after_retry() {
        let transport = Arc::new(ScriptedTransport {
            responses: std::sync::Mutex::new(vec!["not json".to_string(), "still not json".to_string()]),
        });
        let client = LlmClient::new(
            transport,
            LlmConfig {
                host: "http://localhost:11434".to_string(),
                model: DEFAULT_MODEL.to_string(),
                num_ctx: 8192,
                chat_timeout_seconds: 30,
            },
        );
        let thesis = run_debate(&client, &context(), 20.0, 0.8, 65.0).await;
        assert_eq!(thesis.model_used, FALLBACK_MODEL_NAME);
    }

    #[test]
    fn parse_direction_is_case_insensitive() {
        assert_eq!(parse_direction("Bullish"), Some(SignalDirection::Bullish));
        assert_eq!(parse_direction("BEARISH"), Some(SignalDirection::Bearish));
        assert_eq!(parse_direction("unknown"), None);
    }
}
