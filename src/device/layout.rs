use std::str::FromStr;

use serde_derive::Serialize;
use thiserror::Error;

use crate::PanelId;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout declares {count} panels but has {actual} tokens, expected {expected}")]
    Truncated {
        count: usize,
        expected: usize,
        actual: usize,
    },
    #[error("invalid number '{token}' in layout")]
    InvalidNumber { token: String },
}

/// Position of one panel on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Panel {
    pub id: PanelId,
    pub x: i32,
    pub y: i32,
    pub rotation: i32,
    pub side_length: u32,
}

fn number<T: FromStr>(token: &str) -> Result<T, LayoutError> {
    token.parse().map_err(|_| LayoutError::InvalidNumber {
        token: token.to_owned(),
    })
}

/// Parse the `layoutData` string reported by the device
///
/// The format is `<count> <side length>` followed by `<id> <x> <y> <rotation>` for each
/// panel. Data with no more than the header describes no panels.
pub fn parse_layout(data: &str) -> Result<Vec<Panel>, LayoutError> {
    let tokens: Vec<&str> = data.split_whitespace().collect();
    if tokens.len() <= 2 {
        return Ok(Vec::new());
    }

    let count: usize = number(tokens[0])?;
    let side_length: u32 = number(tokens[1])?;

    let expected = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(2))
        .unwrap_or(usize::MAX);
    if tokens.len() < expected {
        return Err(LayoutError::Truncated {
            count,
            expected,
            actual: tokens.len(),
        });
    }

    tokens[2..expected]
        .chunks_exact(4)
        .map(|panel| {
            Ok(Panel {
                id: number(panel[0])?,
                x: number(panel[1])?,
                y: number(panel[2])?,
                rotation: number(panel[3])?,
                side_length,
            })
        })
        .collect()
}
