// src/render/terminal.rs

use crate::peaks::PeakSet;

/// Rasterises `width` columns of one peak channel, starting at pixel
/// `offset`, into rows of block characters. Columns past the end stay blank.
pub fn render_ascii(peaks: &PeakSet, channel: usize, offset: usize, width: usize, height: usize) -> Vec<String> {
    let h = height.max(4);
    let mut lines = vec![vec![' '; width]; h];
    let to_row = |v: f32| -> usize {
        let clamped = v.clamp(-1.0, 1.0);
        let y = (0.5 - 0.5 * clamped) * (h as f32 - 1.0);
        y.round() as usize
    };
    for x in 0..width {
        let Some((min, max)) = peaks.normalized(channel, offset + x) else {
            break;
        };
        let y1 = to_row(max);
        let y0 = to_row(min);
        let (a, b) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        for row in &mut lines[a..=b] {
            row[x] = '█';
        }
    }
    lines.into_iter().map(|row| row.into_iter().collect()).collect()
}

/// Overwrites column `x` with a playhead marker.
pub fn draw_playhead(lines: &mut [String], x: usize) {
    for line in lines.iter_mut() {
        let mut chars: Vec<char> = line.chars().collect();
        if let Some(c) = chars.get_mut(x) {
            *c = '|';
            *line = chars.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::Bits;

    fn peaks(pairs: &[(i32, i32)]) -> PeakSet {
        PeakSet {
            length: pairs.len(),
            bits: Bits::Eight,
            data: vec![pairs.iter().flat_map(|&(a, b)| [a, b]).collect()],
        }
    }

    #[test]
    fn silence_is_a_centre_line_and_peaks_fill_the_column() {
        let p = peaks(&[(0, 0), (-128, 127)]);
        let lines = render_ascii(&p, 0, 0, 3, 5);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2], "██ ");
        assert_eq!(lines[0], " █ ");
        assert_eq!(lines[4], " █ ");
    }

    #[test]
    fn playhead_replaces_one_column() {
        let p = peaks(&[(0, 0), (0, 0)]);
        let mut lines = render_ascii(&p, 0, 0, 2, 4);
        draw_playhead(&mut lines, 1);
        assert!(lines.iter().all(|l| l.ends_with('|')));
    }
}
