//! Built-in executable tools: clock, calculator, web search, planner.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::Tool;
use crate::collaborators::{
    ChatModel, ModelRequest, StructuredSchema, ToolError, WebSearch,
};
use crate::message::Message;

/// Reports the current date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        Ok(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// Evaluates basic arithmetic expressions (`+ - * /`, parentheses, unary
/// minus).
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Only supports basic arithmetic."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "A mathematical expression like '2 + 3 * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let expression = args["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgs {
                message: "expression must be a string".into(),
            })?;
        match eval_expression(expression) {
            Ok(value) => Ok(format_number(value)),
            Err(message) => Ok(format!("Error evaluating expression: {message}")),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Recursive-descent evaluator over `+ - * /` and parentheses.
fn eval_expression(input: &str) -> Result<f64, String> {
    let tokens: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    if let Some(bad) = tokens
        .iter()
        .find(|c| !matches!(c, '0'..='9' | '.' | '+' | '-' | '*' | '/' | '(' | ')'))
    {
        return Err(format!("invalid character: {bad}"));
    }
    let mut pos = 0;
    let value = parse_sum(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("unexpected input at position {pos}"));
    }
    Ok(value)
}

fn parse_sum(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_product(tokens, pos)?;
    while let Some(op) = tokens.get(*pos).copied() {
        match op {
            '+' => {
                *pos += 1;
                value += parse_product(tokens, pos)?;
            }
            '-' => {
                *pos += 1;
                value -= parse_product(tokens, pos)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_product(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(op) = tokens.get(*pos).copied() {
        match op {
            '*' => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            '/' => {
                *pos += 1;
                let divisor = parse_factor(tokens, pos)?;
                if divisor == 0.0 {
                    return Err("division by zero".into());
                }
                value /= divisor;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &[char], pos: &mut usize) -> Result<f64, String> {
    match tokens.get(*pos).copied() {
        Some('-') => {
            *pos += 1;
            Ok(-parse_factor(tokens, pos)?)
        }
        Some('(') => {
            *pos += 1;
            let value = parse_sum(tokens, pos)?;
            if tokens.get(*pos) != Some(&')') {
                return Err("missing closing parenthesis".into());
            }
            *pos += 1;
            Ok(value)
        }
        Some(c) if c.is_ascii_digit() || c == '.' => {
            let start = *pos;
            while tokens
                .get(*pos)
                .map(|c| c.is_ascii_digit() || *c == '.')
                .unwrap_or(false)
            {
                *pos += 1;
            }
            let literal: String = tokens[start..*pos].iter().collect();
            literal
                .parse::<f64>()
                .map_err(|_| format!("invalid number: {literal}"))
        }
        Some(c) => Err(format!("unexpected token: {c}")),
        None => Err("unexpected end of expression".into()),
    }
}

/// Quick web lookup through the [`WebSearch`] collaborator.
pub struct WebSearchTool {
    search: Arc<dyn WebSearch>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self {
            search,
            max_results: 3,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up on the web."
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let query = args["query"].as_str().ok_or_else(|| ToolError::InvalidArgs {
            message: "query must be a string".into(),
        })?;
        match self.search.search(query, self.max_results).await {
            Ok(results) => serde_json::to_string_pretty(&results).map_err(|e| {
                ToolError::Execution {
                    message: e.to_string(),
                }
            }),
            Err(e) => Ok(format!("Error performing web search: {e}")),
        }
    }
}

/// Produces a structured task plan via the model's structured output.
pub struct CreatePlanTool {
    model: Arc<dyn ChatModel>,
}

impl CreatePlanTool {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

pub const TASK_PLAN_SCHEMA: StructuredSchema = StructuredSchema {
    name: "TaskPlan",
    description: "A goal broken into prioritized, ordered tasks",
};

#[async_trait]
impl Tool for CreatePlanTool {
    fn name(&self) -> &str {
        "create_plan"
    }

    fn description(&self) -> &str {
        "Create a structured task plan for achieving a goal. Returns a JSON plan with ordered tasks."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": {
                    "type": "string",
                    "description": "The high-level goal or objective to plan for."
                }
            },
            "required": ["goal"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let goal = args["goal"].as_str().ok_or_else(|| ToolError::InvalidArgs {
            message: "goal must be a string".into(),
        })?;
        let request = ModelRequest::new(vec![Message::user(&format!(
            "Create a detailed, actionable task plan for the following goal:\n\n{goal}\n\n\
             Break it down into concrete steps with priorities."
        ))]);
        let plan = self
            .model
            .generate_structured(request, TASK_PLAN_SCHEMA)
            .await
            .map_err(|e| ToolError::Execution {
                message: e.to_string(),
            })?;
        serde_json::to_string_pretty(&plan).map_err(|e| ToolError::Execution {
            message: e.to_string(),
        })
    }
}
