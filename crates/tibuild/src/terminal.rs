//! Line-based selection list on the terminal.
//!
//! Items are printed as a numbered list with `*` marking the active one.
//! At the prompt, a number picks an item, any other text filters the list,
//! `/` clears the filter, and an empty line or `q` cancels.

use std::io::{self, BufRead, Stdout, Write};

use tibuild_sdk::{BuildError, Prompter, SelectList, SelectableItem};

pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
    list: SelectList,
}

impl TerminalPrompter<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            list: SelectList::new(),
        }
    }

    fn render(&mut self) -> io::Result<()> {
        writeln!(self.output)?;
        if !self.list.filter().is_empty() {
            writeln!(self.output, "filter: {}", self.list.filter())?;
        }
        if let Some(message) = self.list.empty_message() {
            writeln!(self.output, "  {}", message)?;
            return Ok(());
        }
        for (i, item) in self.list.visible_items().into_iter().enumerate() {
            let marker = if self.list.is_active(item) { '*' } else { ' ' };
            writeln!(self.output, "{} {:>2}. {}", marker, i + 1, item.label())?;
            if let Some(detail) = item.detail() {
                writeln!(self.output, "       {}", detail)?;
            }
        }
        Ok(())
    }

    fn read_answer(&mut self) -> io::Result<Option<String>> {
        write!(self.output, "> ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn present(
        &mut self,
        items: Vec<SelectableItem>,
        active: Option<&str>,
    ) -> Result<Option<SelectableItem>, BuildError> {
        self.list.set_items(items, active);
        self.list.show();

        loop {
            self.render()?;
            let answer = match self.read_answer()? {
                Some(answer) if !answer.is_empty() && answer != "q" => answer,
                _ => {
                    self.list.hide();
                    return Ok(None);
                }
            };

            if let Ok(number) = answer.parse::<usize>() {
                match number.checked_sub(1).and_then(|i| self.list.choose(i)) {
                    Some(item) => {
                        self.list.hide();
                        return Ok(Some(item));
                    }
                    None => writeln!(self.output, "No item {}", number)?,
                }
            } else if answer == "/" {
                self.list.set_filter("");
            } else {
                self.list.set_filter(&answer);
            }
        }
    }

    fn set_loading(&mut self, message: &str) {
        self.list.set_loading(message);
        if let Some(loading) = self.list.loading() {
            let _ = writeln!(self.output, "{}", loading);
        }
    }

    fn hide(&mut self) {
        self.list.hide();
    }
}
