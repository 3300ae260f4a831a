//! roll_dice 工具：解析 `NdM` 骰子项与整数修正值（`+` / `-` 连接），如 `1d20+4`、`2d6+1d4-1`
//!
//! 结果渲染为 `total (breakdown)`，例如 `20 ([16] + 4)`。

use std::sync::OnceLock;

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;

use crate::tools::{FunctionTool, ToolContext, ToolError};

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("dice expression is empty")]
    Empty,
    #[error("cannot parse dice expression {0:?}; expected something like 1d20+4")]
    Malformed(String),
    #[error("too many dice ({0}); at most {MAX_DICE} per term")]
    TooManyDice(u32),
    #[error("a die needs between 1 and {MAX_SIDES} sides, got {0}")]
    BadSides(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Dice { count: u32, sides: u32 },
    Constant(i64),
}

static EXPRESSION_RE: OnceLock<Regex> = OnceLock::new();
static TERM_RE: OnceLock<Regex> = OnceLock::new();

fn expression_regex() -> &'static Regex {
    EXPRESSION_RE.get_or_init(|| Regex::new(r"^[+-]?(\d*d\d+|\d+)([+-](\d*d\d+|\d+))*$").unwrap())
}

fn term_regex() -> &'static Regex {
    TERM_RE.get_or_init(|| Regex::new(r"([+-]?)(?:(\d*)d(\d+)|(\d+))").unwrap())
}

/// 解析为 (是否取负, 项) 列表
fn parse(expr: &str) -> Result<Vec<(bool, Term)>, DiceError> {
    let normalized: String = expr
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if normalized.is_empty() {
        return Err(DiceError::Empty);
    }
    if !expression_regex().is_match(&normalized) {
        return Err(DiceError::Malformed(expr.to_string()));
    }

    let malformed = || DiceError::Malformed(expr.to_string());
    let mut terms = Vec::new();
    for caps in term_regex().captures_iter(&normalized) {
        let negative = caps.get(1).is_some_and(|m| m.as_str() == "-");
        let term = if let Some(sides) = caps.get(3) {
            let count = match caps.get(2).map(|m| m.as_str()) {
                None | Some("") => 1,
                Some(n) => n.parse::<u32>().map_err(|_| malformed())?,
            };
            let sides = sides.as_str().parse::<u32>().map_err(|_| malformed())?;
            if count == 0 || count > MAX_DICE {
                return Err(DiceError::TooManyDice(count));
            }
            if sides == 0 || sides > MAX_SIDES {
                return Err(DiceError::BadSides(sides));
            }
            Term::Dice { count, sides }
        } else {
            let n = caps
                .get(4)
                .ok_or_else(malformed)?
                .as_str()
                .parse::<i64>()
                .map_err(|_| malformed())?;
            Term::Constant(n)
        };
        terms.push((negative, term));
    }
    Ok(terms)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    pub total: i64,
    pub breakdown: String,
}

impl std::fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.total, self.breakdown)
    }
}

pub fn roll<R: Rng + ?Sized>(expr: &str, rng: &mut R) -> Result<DiceRoll, DiceError> {
    let terms = parse(expr)?;
    let mut total: i64 = 0;
    let mut breakdown = String::new();

    for (i, (negative, term)) in terms.iter().enumerate() {
        let (value, shown) = match term {
            Term::Dice { count, sides } => {
                let faces: Vec<i64> = (0..*count).map(|_| i64::from(rng.gen_range(1..=*sides))).collect();
                let shown = faces.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
                (faces.iter().sum::<i64>(), format!("[{shown}]"))
            }
            Term::Constant(n) => (*n, n.to_string()),
        };
        total = if *negative { total.saturating_sub(value) } else { total.saturating_add(value) };

        match (i, negative) {
            (0, true) => breakdown.push('-'),
            (0, false) => {}
            (_, true) => breakdown.push_str(" - "),
            (_, false) => breakdown.push_str(" + "),
        }
        breakdown.push_str(&shown);
    }

    Ok(DiceRoll { total, breakdown })
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RollDiceArgs {
    /// Dice expression to roll, e.g. 1d20+4 or 2d6+1d4-1
    pub prompt: String,
}

pub struct RollDiceTool;

#[async_trait]
impl FunctionTool for RollDiceTool {
    type Args = RollDiceArgs;

    const NAME: &'static str = "roll_dice";
    const DESCRIPTION: &'static str =
        "Rolls dice written in standard notation (NdM terms and integer modifiers joined by + or -) and returns the total with a breakdown";

    async fn call(&self, ctx: &ToolContext, args: RollDiceArgs) -> Result<String, ToolError> {
        let result = {
            let mut rng = rand::thread_rng();
            roll(&args.prompt, &mut rng)
        };
        let rolled = result.map_err(|e| ToolError::Execution(format!("failed to roll dice: {e}")))?;
        tracing::debug!(conversation_id = ctx.conversation_id, prompt = %args.prompt, total = rolled.total, "dice rolled");
        Ok(rolled.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_parse_terms() {
        let terms = parse("2d6 + d4 - 1").unwrap();
        assert_eq!(
            terms,
            vec![
                (false, Term::Dice { count: 2, sides: 6 }),
                (false, Term::Dice { count: 1, sides: 4 }),
                (true, Term::Constant(1)),
            ]
        );
    }

    #[test]
    fn test_roll_is_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let r = roll("1d20+4", &mut rng).unwrap();
            assert!((5..=24).contains(&r.total), "{r}");
            assert!(r.breakdown.starts_with('['));
            assert!(r.breakdown.ends_with("] + 4"));
        }
    }

    #[test]
    fn test_breakdown_matches_total() {
        let mut rng = StdRng::seed_from_u64(11);
        let r = roll("3d1-2", &mut rng).unwrap();
        assert_eq!(r.total, 1);
        assert_eq!(r.to_string(), "1 ([1, 1, 1] - 2)");

        let r = roll("-1d1+5", &mut rng).unwrap();
        assert_eq!(r.to_string(), "4 (-[1] + 5)");
    }

    #[test]
    fn test_rejects_bad_expressions() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(roll("   ", &mut rng), Err(DiceError::Empty));
        assert!(matches!(roll("1d20+", &mut rng), Err(DiceError::Malformed(_))));
        assert!(matches!(roll("fireball", &mut rng), Err(DiceError::Malformed(_))));
        assert_eq!(roll("1000d6", &mut rng), Err(DiceError::TooManyDice(1000)));
        assert_eq!(roll("1d0", &mut rng), Err(DiceError::BadSides(0)));
    }

    #[tokio::test]
    async fn test_tool_reports_failure_as_execution_error() {
        let ctx = ToolContext::new(1);
        let out = RollDiceTool
            .call(&ctx, RollDiceArgs { prompt: "2d6".into() })
            .await
            .unwrap();
        assert!(out.contains("(["), "{out}");

        let err = RollDiceTool
            .call(&ctx, RollDiceArgs { prompt: "d".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(msg) if msg.starts_with("failed to roll dice")));
    }
}
