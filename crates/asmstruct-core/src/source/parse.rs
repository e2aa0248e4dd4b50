//! Listing parser.
//!
//! Input format: three header integers (instruction count, label count,
//! maximum line length), then one label or instruction per line. A line
//! ending in `:` is a label for the next instruction; labels that do not
//! start with `.` mark procedure entries.

use std::collections::HashMap;

use log::{debug, warn};

use super::{InstKind, Instruction, Listing, OpcodeTable};
use crate::error::{CoreError, Result};

/// Header values as declared by the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    instructions: usize,
    labels: usize,
}

/// Parse `text` into a listing with resolved branch and jump targets.
pub fn parse_listing(text: &str, file: &str, table: &OpcodeTable) -> Result<Listing> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
    let header = parse_header(&mut lines, file)?;

    let mut instructions: Vec<Instruction> = Vec::with_capacity(header.instructions);
    // Operand labels per instruction, resolved once every label is known.
    let mut operands: Vec<(usize, Vec<String>)> = Vec::new();
    let mut label_index: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<(usize, String)> = Vec::new();

    for (line_no, raw) in lines {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if let Some(label) = line.strip_suffix(':') {
            let label = label.trim().to_string();
            if label_index.contains_key(&label) || pending.iter().any(|(_, l)| *l == label) {
                return Err(parse_error(file, line_no, format!("duplicate label '{label}'")));
            }
            pending.push((line_no, label));
            continue;
        }

        let idx = instructions.len();
        let mut inst = parse_instruction(line, line_no, file, table)?;
        for (_, label) in pending.drain(..) {
            label_index.insert(label.clone(), idx);
            if label.starts_with('.') {
                inst.labels.push(label);
            } else {
                inst.proc_label = Some(label);
            }
        }
        operands.push((line_no, operand_labels(&inst)));
        instructions.push(inst);
    }

    if let Some((line_no, label)) = pending.first() {
        return Err(parse_error(
            file,
            *line_no,
            format!("label '{label}' does not precede an instruction"),
        ));
    }

    if instructions.len() != header.instructions {
        warn!(
            "{file}: header declares {} instructions, found {}",
            header.instructions,
            instructions.len()
        );
    }
    if label_index.len() != header.labels {
        debug!(
            "{file}: header declares {} labels, found {}",
            header.labels,
            label_index.len()
        );
    }

    for (inst, (line_no, labels)) in instructions.iter_mut().zip(operands) {
        let mut resolved = Vec::with_capacity(labels.len());
        for label in labels {
            let target = *label_index
                .get(&label)
                .ok_or_else(|| CoreError::UnresolvedLabel {
                    label: label.clone(),
                    line: line_no,
                })?;
            if !resolved.contains(&target) {
                resolved.push(target);
            }
        }
        match inst.kind {
            InstKind::Branch | InstKind::Jump => inst.branch_target = resolved.first().copied(),
            InstKind::MultiWay => inst.jump_targets = resolved,
            _ => {}
        }
    }

    Ok(Listing {
        file: file.to_string(),
        instructions,
        declared_instructions: header.instructions,
        delay_slots: table.delay_slots,
    })
}

fn parse_header<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    file: &str,
) -> Result<Header> {
    let mut values = Vec::with_capacity(3);
    let mut last_line = 0;
    while values.len() < 3 {
        let Some((line_no, line)) = lines.next() else {
            return Err(parse_error(
                file,
                last_line,
                format!("expected 3 header values, found {}", values.len()),
            ));
        };
        last_line = line_no;
        for token in line.split_whitespace() {
            if values.len() == 3 {
                break;
            }
            let value: usize = token.parse().map_err(|_| {
                parse_error(file, line_no, format!("header value '{token}' is not a count"))
            })?;
            values.push(value);
        }
    }
    // The third value is the maximum line length; lines are not buffered.
    Ok(Header {
        instructions: values[0],
        labels: values[1],
    })
}

fn parse_instruction(
    line: &str,
    line_no: usize,
    file: &str,
    table: &OpcodeTable,
) -> Result<Instruction> {
    let Some(start) = line.find(|c: char| c.is_ascii_alphabetic()) else {
        return Err(parse_error(file, line_no, "instruction has no mnemonic".to_string()));
    };
    let text = &line[start..];
    let mnemonic_len = text
        .find(|c: char| !(c.is_ascii_alphabetic() || c == ','))
        .unwrap_or(text.len());
    let mnemonic = &text[..mnemonic_len];
    let kind = table.classify(mnemonic);

    if kind.has_branch_target() && text.split_whitespace().nth(1).is_none() {
        return Err(parse_error(
            file,
            line_no,
            format!("'{mnemonic}' has no target label"),
        ));
    }

    Ok(Instruction {
        text: text.to_string(),
        mnemonic: mnemonic.to_string(),
        kind,
        line: line_no,
        proc_label: None,
        labels: Vec::new(),
        branch_target: None,
        jump_targets: Vec::new(),
    })
}

fn operand_labels(inst: &Instruction) -> Vec<String> {
    let mut tokens = inst.text.split_whitespace().skip(1);
    match inst.kind {
        InstKind::Branch | InstKind::Jump => tokens.next().map(str::to_string).into_iter().collect(),
        InstKind::MultiWay => tokens.map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn parse_error(file: &str, line: usize, message: String) -> CoreError {
    CoreError::Parse {
        file: file.to_string(),
        line,
        message,
    }
}
