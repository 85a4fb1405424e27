// Line-oriented grammar file reader.
//
// The format is plain text:
//
//   FSG_BEGIN <name>
//   NUM_STATES <n>
//   START_STATE <s>
//   FINAL_STATE <f>
//   TRANSITION <from> <to> <prob> [<word>]
//   FSG_END
//
// A transition without a word is a null (epsilon) transition. `#` starts a
// comment; blank lines are ignored. Keywords also accept their single-letter
// forms (N, S, F, T). Probabilities are converted to the integer log domain,
// scaled by the language weight, at read time. The null-transition closure
// is computed before the model is returned.

use std::fs;
use std::path::Path;

use crate::logmath::LogMath;
use crate::model::FsgModel;
use crate::FsgError;

/// Read a grammar from a file. See the module comment for the format.
pub fn read_fsg_file(
    path: &Path,
    lmath: LogMath,
    lw: f64,
) -> Result<FsgModel, FsgError> {
    let text = fs::read_to_string(path)?;
    parse_fsg(&text, lmath, lw)
}

/// Parse a grammar from text.
pub fn parse_fsg(text: &str, lmath: LogMath, lw: f64) -> Result<FsgModel, FsgError> {
    let mut name: Option<String> = None;
    let mut model: Option<FsgModel> = None;
    let mut start_state: Option<usize> = None;
    let mut final_state: Option<usize> = None;
    // Transitions seen before NUM_STATES are buffered as raw fields.
    let mut pending: Vec<(usize, (usize, usize, f64, Option<String>))> = Vec::new();
    let mut n_states: Option<usize> = None;
    let mut ended = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if line.is_empty() {
            continue;
        }
        if ended {
            return Err(parse_err(line_no, "content after FSG_END"));
        }

        let mut fields = line.split_whitespace();
        let keyword = fields.next().unwrap_or_default();
        match keyword {
            "FSG_BEGIN" => {
                name = Some(fields.next().unwrap_or("fsg").to_string());
            }
            "NUM_STATES" | "N" => {
                let n: usize = parse_field(line_no, fields.next(), "state count")?;
                if n == 0 {
                    return Err(parse_err(line_no, "grammar must have at least one state"));
                }
                n_states = Some(n);
            }
            "START_STATE" | "S" => {
                start_state = Some(parse_field(line_no, fields.next(), "start state")?);
            }
            "FINAL_STATE" | "F" => {
                final_state = Some(parse_field(line_no, fields.next(), "final state")?);
            }
            "TRANSITION" | "T" => {
                let from: usize = parse_field(line_no, fields.next(), "source state")?;
                let to: usize = parse_field(line_no, fields.next(), "target state")?;
                let prob: f64 = parse_field(line_no, fields.next(), "probability")?;
                if !(prob > 0.0) {
                    return Err(parse_err(line_no, "transition probability must be > 0"));
                }
                let word = fields.next().map(str::to_string);
                pending.push((line_no, (from, to, prob, word)));
            }
            "FSG_END" => {
                ended = true;
            }
            other => {
                return Err(parse_err(line_no, &format!("unknown keyword `{other}`")));
            }
        }

        // As soon as the header is complete, materialise the model so that
        // transition state ids can be validated as they arrive.
        if model.is_none() {
            if let (Some(n), Some(s), Some(f)) = (n_states, start_state, final_state) {
                let mut m = FsgModel::new(
                    name.as_deref().unwrap_or("fsg"),
                    n,
                    s,
                    f,
                    lmath,
                    lw,
                )?;
                for (ln, (from, to, prob, word)) in pending.drain(..) {
                    add_pending(&mut m, ln, from, to, prob, word.as_deref())?;
                }
                model = Some(m);
            }
        } else if let Some(m) = model.as_mut() {
            for (ln, (from, to, prob, word)) in pending.drain(..) {
                add_pending(m, ln, from, to, prob, word.as_deref())?;
            }
        }
    }

    if !ended {
        return Err(parse_err(text.lines().count(), "missing FSG_END"));
    }
    let mut model = model.ok_or_else(|| {
        parse_err(
            text.lines().count(),
            "incomplete header (NUM_STATES, START_STATE and FINAL_STATE are required)",
        )
    })?;

    model.null_trans_closure();
    log::info!(
        "read grammar `{}`: {} states, {} words",
        model.name(),
        model.n_state(),
        model.n_word()
    );
    Ok(model)
}

fn add_pending(
    model: &mut FsgModel,
    line_no: usize,
    from: usize,
    to: usize,
    prob: f64,
    word: Option<&str>,
) -> Result<(), FsgError> {
    let result = match word {
        Some(w) => model.add_trans(from, to, prob, w),
        None => model.add_null_trans(from, to, prob),
    };
    result.map_err(|e| parse_err(line_no, &e.to_string()))
}

fn parse_field<T: std::str::FromStr>(
    line_no: usize,
    field: Option<&str>,
    what: &str,
) -> Result<T, FsgError> {
    field
        .ok_or_else(|| parse_err(line_no, &format!("missing {what}")))?
        .parse()
        .map_err(|_| parse_err(line_no, &format!("malformed {what}")))
}

fn parse_err(line: usize, msg: &str) -> FsgError {
    FsgError::Parse {
        line,
        msg: msg.to_string(),
    }
}
