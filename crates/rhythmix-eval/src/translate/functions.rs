//! Stateful functions: `count`, `delay`, `keep`, `slope`.

use rhythmix_parser::AstNode;

use super::{Fragment, Subject, Translator, block, types};
use crate::error::{EvalError, Result};
use crate::value::Value;

impl Translator<'_> {
    /// `count(pred, n)` / `count!(pred, n)`.
    pub(super) fn count(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        self.arity(node, &[2])?;
        let args = node.args();
        let n = types::int_arg("count", &args[1], self.env)?;
        if n <= 0 {
            return Err(EvalError::translation(
                format!("count expects a positive count, got {n}"),
                &args[1].lexeme,
            ));
        }
        let pred = self.node(&args[0], subject)?;
        let counter = self.declare("count", Value::Int(0));

        let mut steps = pred.steps;
        let mut update = format!("if {} {{ {counter} = ({counter} + 1) }}", pred.expr);
        if node.strict {
            update.push_str(&format!(" else {{ {counter} = 0 }}"));
        }
        steps.push(update);
        Ok(Fragment {
            steps,
            expr: format!("({counter} >= {n})"),
        })
    }

    /// `delay(dur)`: true once `dur` has passed since the first event.
    pub(super) fn delay(&mut self, node: &AstNode) -> Result<Fragment> {
        self.arity(node, &[1])?;
        let ms = types::duration_arg("delay", &node.args()[0])?;
        let start = self.declare("delay", Value::Nil);
        let ts = self.ts();
        Ok(Fragment {
            steps: vec![format!("if is_nil({start}) {{ {start} = {ts} }}")],
            expr: format!("(({ts} - {start}) >= {ms})"),
        })
    }

    /// `keep(pred, dur)`: `pred` has held without interruption for `dur`.
    pub(super) fn keep(&mut self, node: &AstNode, subject: &Subject) -> Result<Fragment> {
        self.arity(node, &[2])?;
        let args = node.args();
        let ms = types::duration_arg("keep", &args[1])?;
        let pred = self.node(&args[0], subject)?;
        let since = self.declare("keep", Value::Nil);
        let ts = self.ts();

        let mut steps = pred.steps;
        steps.push(format!(
            "if {} {{ if is_nil({since}) {{ {since} = {ts} }} }} else {{ {since} = nil }}",
            pred.expr
        ));
        Ok(Fragment {
            steps,
            expr: format!("(!is_nil({since}) && (({ts} - {since}) >= {ms}))"),
        })
    }

    /// `slope(pred, dur)`: `pred` tested against the rate of change between
    /// consecutive numeric samples, scaled to `dur`.
    pub(super) fn slope(&mut self, node: &AstNode) -> Result<Fragment> {
        self.arity(node, &[1, 2])?;
        let args = node.args();
        let Some(window) = args.get(1) else {
            // no window: nothing to scale by, never true
            let rate = Subject::Scalar("nil".to_string());
            self.node(&args[0], &rate)?;
            return Ok(Fragment::pure("false"));
        };
        let ms = types::duration_arg("slope", window)?;

        let last_ts = self.declare("slopeLastTs", Value::Nil);
        let last_value = self.declare("slopeLastValue", Value::Nil);
        let rate = self.declare("slope", Value::Nil);
        let pred = self.node(&args[0], &Subject::Scalar(rate.clone()))?;

        let ts = self.ts();
        let v = format!("num({}.value)", self.event);
        let sample = [
            format!(
                "if (is_nil({last_ts}) || ({ts} == {last_ts})) {{ {rate} = nil }} else {{ {rate} = ((({v} - {last_value}) * {ms}) / ({ts} - {last_ts})) }}"
            ),
            format!("{last_ts} = {ts}"),
            format!("{last_value} = {v}"),
        ];
        let mut steps = vec![format!(
            "if is_nil({v}) {{ {rate} = nil }} else {}",
            block(&sample)
        )];
        steps.extend(pred.steps);
        Ok(Fragment {
            steps,
            expr: format!("(!is_nil({rate}) && {})", pred.expr),
        })
    }
}
