use std::io::{self, Write};

use termion::color::{Bg, Fg, Reset, Rgb};

use crate::{pos, Pos};

pub type Pixel = (u8, u8, u8);

/// pixel buffer drawn with half blocks, two pixel rows per terminal line.
pub struct Canvas {
    pixels: Vec<Option<Pixel>>,
    width: usize,
    height: usize,
}

impl Canvas {
    /// a canvas covering the terminal, minus one line for the status bar.
    pub fn from_screen() -> io::Result<Self> {
        let (width, height) = termion::terminal_size()?;
        let lines = height.saturating_sub(1) as usize;
        Ok(Self::new(width as usize, lines * 2))
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![None; width * height],
            width,
            height,
        }
    }

    pub fn layer(&mut self, f: impl Fn(Pos) -> Option<Pixel>) {
        for (y, row) in (0..self.height).zip(0..) {
            for (x, column) in (0..self.width).zip(0..) {
                if let Some(pixel) = f(pos!(column, row)) {
                    self.pixels[y * self.width + x] = Some(pixel);
                }
            }
        }
    }

    fn pixel(&self, x: usize, y: usize) -> Option<Pixel> {
        (y < self.height)
            .then(|| self.pixels[y * self.width + x])
            .flatten()
    }

    fn render(&self, status: &str) -> String {
        let mut result = String::new();
        let lines = self.height.div_ceil(2);
        for line in 0..lines {
            let goto = termion::cursor::Goto(1, line as u16 + 1);
            result += &format!("{goto}");
            for x in 0..self.width {
                let top = self.pixel(x, line * 2);
                let bottom = self.pixel(x, line * 2 + 1);
                let cell = match (top, bottom) {
                    (Some((r, g, b)), Some((br, bg, bb))) => {
                        format!("{}{}▀", Fg(Rgb(r, g, b)), Bg(Rgb(br, bg, bb)))
                    }
                    (Some((r, g, b)), None) => format!("{}{}▀", Fg(Rgb(r, g, b)), Bg(Reset)),
                    (None, Some((r, g, b))) => format!("{}{}▄", Fg(Rgb(r, g, b)), Bg(Reset)),
                    (None, None) => format!("{} ", Bg(Reset)),
                };
                result += &cell;
            }
        }
        let goto = termion::cursor::Goto(1, lines as u16 + 1);
        result += &format!("{goto}{}{}{status}", Fg(Reset), Bg(Reset));
        result
    }

    pub fn display(&self, out: &mut impl Write, status: &str) -> io::Result<()> {
        let clear = termion::clear::All;
        write!(out, "{clear}{}", self.render(status))?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_only_paints_some() {
        let mut canvas = Canvas::new(3, 2);
        canvas.layer(|p| (p.x == 1).then_some((1, 2, 3)));
        assert_eq!(canvas.pixel(0, 0), None);
        assert_eq!(canvas.pixel(1, 0), Some((1, 2, 3)));
        assert_eq!(canvas.pixel(1, 1), Some((1, 2, 3)));
        assert_eq!(canvas.pixel(1, 2), None);
    }

    #[test]
    fn two_rows_per_line() {
        let mut canvas = Canvas::new(2, 3);
        canvas.layer(|_| Some((9, 9, 9)));
        let rendered = canvas.render("workers: 1");
        assert_eq!(rendered.matches('▀').count(), 4);
        assert!(rendered.ends_with("workers: 1"));
    }
}
