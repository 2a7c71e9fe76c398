//! # Arrival Board Rendering
//!
//! This module turns a snapshot into pixels for the e-ink panel and into text for the
//! console display used in development mode.
//!
//! Both layouts show the same thing: a header with the capture time, then one row
//! per arrival in feed order with the selected row highlighted. When there are more
//! arrivals than rows, the visible window scrolls so the selection stays on screen.

use crate::ArrivalSnapshot;
use chrono::Local;
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10},
        MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

/// Height of the header band in pixels
const HEADER_HEIGHT: i32 = 30;
/// Height of one arrival row in pixels
const ROW_HEIGHT: i32 = 32;
/// Left and right padding
const MARGIN: i32 = 6;
/// Route column width in characters of the large font
const ROUTE_CHARS: usize = 8;
/// Pixel width of one large-font character
const CHAR_WIDTH: i32 = 10;

/// Width of the console board in characters
pub const ASCII_WIDTH: usize = 44;

/// Top pixel row of arrival row `slot`.
pub fn row_top(slot: usize) -> i32 {
    HEADER_HEIGHT + 4 + slot as i32 * ROW_HEIGHT
}

/// Number of arrival rows that fit on a target of `height` pixels.
pub fn visible_rows(height: u32) -> usize {
    ((height as i32 - HEADER_HEIGHT - 4).max(0) / ROW_HEIGHT) as usize
}

/// First record shown so that `selected` is inside a window of `rows` rows.
pub fn window_start(selected: usize, rows: usize) -> usize {
    if rows == 0 || selected < rows {
        0
    } else {
        selected + 1 - rows
    }
}

/// Draw the arrival board with `selected` highlighted.
pub fn draw_board<D>(snapshot: &ArrivalSnapshot, selected: usize, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let size = target.bounding_box().size;
    let width = size.width as i32;

    draw_header(snapshot, width, target)?;

    let rows = visible_rows(size.height);
    let start = window_start(selected, rows);
    let dest_chars = ((width - 2 * MARGIN) / CHAR_WIDTH) as usize;
    let dest_chars = dest_chars.saturating_sub(ROUTE_CHARS + 1 + 7);

    for (slot, (index, record)) in snapshot
        .records()
        .iter()
        .enumerate()
        .skip(start)
        .take(rows)
        .enumerate()
    {
        let top = row_top(slot);
        let is_selected = index == selected;

        let (fg, bg) = if is_selected {
            (BinaryColor::Off, BinaryColor::On)
        } else {
            (BinaryColor::On, BinaryColor::Off)
        };
        if is_selected {
            Rectangle::new(Point::new(0, top), Size::new(size.width, ROW_HEIGHT as u32 - 2))
                .into_styled(PrimitiveStyle::with_fill(bg))
                .draw(target)?;
        }

        let large = MonoTextStyle::new(&FONT_10X20, fg);
        let text_y = top + 5;

        Text::with_baseline(
            &truncate(record.route(), ROUTE_CHARS),
            Point::new(MARGIN, text_y),
            large,
            Baseline::Top,
        )
        .draw(target)?;

        Text::with_baseline(
            &truncate(record.destination(), dest_chars),
            Point::new(MARGIN + (ROUTE_CHARS as i32 + 1) * CHAR_WIDTH, text_y),
            large,
            Baseline::Top,
        )
        .draw(target)?;

        let right = TextStyleBuilder::new()
            .alignment(Alignment::Right)
            .baseline(Baseline::Top)
            .build();
        Text::with_text_style(
            &record.minutes_label(),
            Point::new(width - MARGIN, text_y),
            large,
            right,
        )
        .draw(target)?;
    }

    Ok(())
}

/// Draw a centered, word-wrapped message (the "no data" placeholder, errors).
pub fn draw_message<D>(text: &str, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let size = target.bounding_box().size;
    let per_line = ((size.width as i32 - 2 * MARGIN) / CHAR_WIDTH).max(1) as usize;
    let lines = wrap(text, per_line);

    let style = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let centered = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();

    let line_height = 24;
    let block = lines.len() as i32 * line_height;
    let mut y = (size.height as i32 - block) / 2;
    for line in &lines {
        Text::with_text_style(line, Point::new(size.width as i32 / 2, y), style, centered)
            .draw(target)?;
        y += line_height;
    }
    Ok(())
}

fn draw_header<D>(snapshot: &ArrivalSnapshot, width: i32, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let large = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let small = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

    Text::with_baseline("Next arrivals", Point::new(MARGIN, 4), large, Baseline::Top)
        .draw(target)?;

    let right = TextStyleBuilder::new()
        .alignment(Alignment::Right)
        .baseline(Baseline::Top)
        .build();
    Text::with_text_style(
        &header_time(snapshot),
        Point::new(width - MARGIN, 4),
        large,
        right,
    )
    .draw(target)?;

    if snapshot.is_simulated() {
        Text::with_text_style("DEMO", Point::new(width - MARGIN - 60, 9), small, right)
            .draw(target)?;
    }

    Line::new(
        Point::new(0, HEADER_HEIGHT - 2),
        Point::new(width - 1, HEADER_HEIGHT - 2),
    )
    .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 2))
    .draw(target)?;

    Ok(())
}

/// Render the board as text for the console display.
pub fn format_board(snapshot: &ArrivalSnapshot, selected: usize) -> String {
    let mut out = String::new();

    let title = if snapshot.is_simulated() {
        "Next arrivals (DEMO)"
    } else {
        "Next arrivals"
    };
    let time = header_time(snapshot);
    out.push_str(&format!(
        "{title}{time:>width$}\n",
        width = ASCII_WIDTH - title.len()
    ));
    out.push_str(&"-".repeat(ASCII_WIDTH));
    out.push('\n');

    let dest_chars = ASCII_WIDTH - 2 - ROUTE_CHARS - 1 - 8;
    for (index, record) in snapshot.records().iter().enumerate() {
        let marker = if index == selected { '>' } else { ' ' };
        out.push_str(&format!(
            "{marker} {route:<rw$} {dest:<dw$}{mins:>8}\n",
            route = truncate(record.route(), ROUTE_CHARS),
            rw = ROUTE_CHARS,
            dest = truncate(record.destination(), dest_chars),
            dw = dest_chars,
            mins = record.minutes_label(),
        ));
    }
    out
}

/// Render a message as a framed text block for the console display.
pub fn format_message(text: &str) -> String {
    let inner = ASCII_WIDTH - 4;
    let mut out = format!("+{}+\n", "-".repeat(ASCII_WIDTH - 2));
    for line in wrap(text, inner) {
        out.push_str(&format!("| {line:^inner$} |\n"));
    }
    out.push_str(&format!("+{}+\n", "-".repeat(ASCII_WIDTH - 2)));
    out
}

fn header_time(snapshot: &ArrivalSnapshot) -> String {
    snapshot
        .captured_at()
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string()
}

/// Cut `text` to at most `max` characters, marking the cut with `~`.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('~');
    cut
}

/// Greedy word wrap; words longer than a line are split.
fn wrap(text: &str, per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > per_line {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(per_line);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > per_line && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epd4in2b_v2::{DisplayBuffer, Rotation, EPD_HEIGHT, EPD_WIDTH};
    use crate::ArrivalRecord;

    fn test_snapshot() -> ArrivalSnapshot {
        ArrivalSnapshot::new(vec![
            ArrivalRecord::new("A", "X", Some(3)),
            ArrivalRecord::new("B", "Y", Some(7)),
            ArrivalRecord::new("Train 12", "A very long destination name indeed", None),
        ])
    }

    #[test]
    fn board_highlights_selected_row() {
        let snapshot = test_snapshot();
        let mut buffer = DisplayBuffer::new(EPD_WIDTH, EPD_HEIGHT);
        draw_board(&snapshot, 1, &mut buffer).unwrap();

        // Left padding of the selected row is filled, the others are not
        assert!(buffer.is_black(1, row_top(1) as u32 + 1));
        assert!(!buffer.is_black(1, row_top(0) as u32 + 1));
        assert!(!buffer.is_black(1, row_top(2) as u32 + 1));
    }

    #[test]
    fn board_draws_something_in_every_rotation() {
        let snapshot = test_snapshot();
        for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            let mut buffer = DisplayBuffer::with_rotation(EPD_WIDTH, EPD_HEIGHT, rotation);
            draw_board(&snapshot, 0, &mut buffer).unwrap();
            assert!(buffer.black_pixel_count() > 0, "{rotation:?} drew nothing");
        }
    }

    #[test]
    fn message_is_drawn_near_center() {
        let mut buffer = DisplayBuffer::new(EPD_WIDTH, EPD_HEIGHT);
        draw_message("No arrival data", &mut buffer).unwrap();
        assert!(buffer.black_pixel_count() > 0);
        // Nothing in the header band
        assert!((0..EPD_WIDTH).all(|x| !buffer.is_black(x, 5)));
    }

    #[test]
    fn window_follows_selection() {
        assert_eq!(visible_rows(300), 8);
        assert_eq!(window_start(3, 8), 0);
        assert_eq!(window_start(8, 8), 1);
        assert_eq!(window_start(11, 8), 4);
        assert_eq!(window_start(5, 0), 0);
    }

    #[test]
    fn ascii_board_marks_selection_and_keeps_order() {
        let board = format_board(&test_snapshot(), 1);
        let rows: Vec<&str> = board.lines().skip(2).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("  A "));
        assert!(rows[1].starts_with("> B "));
        assert!(rows[0].ends_with("3 min"));
        assert!(rows[2].ends_with("--"));
        assert!(rows.iter().all(|r| r.chars().count() == ASCII_WIDTH));
    }

    #[test]
    fn ascii_board_flags_demo_data() {
        let board = format_board(&test_snapshot().into_simulated(), 0);
        assert!(board.starts_with("Next arrivals (DEMO)"));
    }

    #[test]
    fn ascii_message_is_framed() {
        let message = format_message("No arrival data");
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("No arrival data"));
    }

    #[test]
    fn truncate_and_wrap() {
        assert_eq!(truncate("Downtown", 8), "Downtown");
        assert_eq!(truncate("Downtown Loop", 8), "Downtow~");
        assert_eq!(wrap("No arrival data available", 10), vec!["No arrival", "data", "available"]);
        assert_eq!(wrap("abcdefghijkl", 5), vec!["abcde", "fghij", "kl"]);
        assert_eq!(wrap("", 5), vec![""]);
    }
}
