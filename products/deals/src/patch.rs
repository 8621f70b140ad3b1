use serde_json::{Map, Value};

use crate::error::{DealError, DealResult};
use crate::model::DealInput;

const CLOSED_AT: &str = "closed_at";

/// Partial update of a deal. Each field is `Some` only when the client sent it.
///
/// `closed_at` is tracked as a bare presence flag: it is derived from the
/// status, so the engine refuses any patch that carries it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DealPatch {
    pub request_id: Option<i32>,
    pub executor_id: Option<i32>,
    pub agreed_price: Option<f64>,
    pub status: Option<String>,
    pub closed_at_present: bool,
}

impl DealPatch {
    /// Type-check a decoded JSON object, field by field. Unknown keys are ignored.
    pub fn from_json(fields: &Map<String, Value>) -> DealResult<Self> {
        Ok(Self {
            request_id: id_field(fields, "request_id")?,
            executor_id: id_field(fields, "executor_id")?,
            agreed_price: number_field(fields, "agreed_price")?,
            status: string_field(fields, "status")?,
            closed_at_present: fields.contains_key(CLOSED_AT),
        })
    }

    /// Overlay the present fields onto `base`.
    pub fn apply(self, mut base: DealInput) -> DealInput {
        if let Some(request_id) = self.request_id {
            base.request_id = request_id;
        }
        if let Some(executor_id) = self.executor_id {
            base.executor_id = executor_id;
        }
        if let Some(agreed_price) = self.agreed_price {
            base.agreed_price = agreed_price;
        }
        if let Some(status) = self.status {
            base.status = status;
        }
        base
    }
}

/// Ids arrive as JSON numbers; fractions are truncated toward zero.
fn id_field(fields: &Map<String, Value>, field: &'static str) -> DealResult<Option<i32>> {
    let Some(value) = fields.get(field) else {
        return Ok(None);
    };
    let whole = value.as_i64().or_else(|| value.as_f64().map(|f| f.trunc() as i64));
    whole
        .and_then(|n| i32::try_from(n).ok())
        .map(Some)
        .ok_or(DealError::InvalidFieldType {
            field,
            expected: "a number",
        })
}

fn number_field(fields: &Map<String, Value>, field: &'static str) -> DealResult<Option<f64>> {
    match fields.get(field) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or(DealError::InvalidFieldType {
            field,
            expected: "a number",
        }),
    }
}

fn string_field(fields: &Map<String, Value>, field: &'static str) -> DealResult<Option<String>> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(DealError::InvalidFieldType {
            field,
            expected: "a string",
        }),
    }
}
