use console::{Emoji, style};

pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!();
    println!(
        "{}",
        style("  gatewatch  ").bold().black().on_cyan()
    );
    println!(
        "{}\n",
        style("Live telemetry for your agent gateway.").cyan()
    );
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("gatewatch stopped.").bold().cyan());
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Info(String),
    Blank,
}

/// A titled block of aligned rows, printed at once.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn info(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Info(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn render(&self) -> Vec<String> {
        let width = self
            .lines
            .iter()
            .filter_map(|line| match line {
                GuideLine::Command(name, _) => Some(name.chars().count()),
                GuideLine::Status(label, _) => Some(label.chars().count() + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let mut out = vec![format!("{}", style(&self.title).bold().underlined())];
        for line in &self.lines {
            out.push(match line {
                GuideLine::Command(name, description) => format!(
                    "  {}  {}",
                    style(format!("{:<width$}", name)).green(),
                    style(description).dim()
                ),
                GuideLine::Status(label, value) => format!(
                    "  {} {}",
                    style(format!("{:<width$}", format!("{}:", label))).bold().cyan(),
                    value
                ),
                GuideLine::Info(text) => format!("  {} {}", GEAR, text),
                GuideLine::Blank => String::new(),
            });
        }
        out
    }

    pub fn print(self) {
        println!();
        for line in self.render() {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guide_section_keeps_row_order() {
        console::set_colors_enabled(false);
        let lines = GuideSection::new("Gateway")
            .status("URL", "http://127.0.0.1:18789")
            .blank()
            .command("serve", "Run the API server")
            .render();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Gateway");
        assert!(lines[1].contains("URL:"));
        assert!(lines[1].ends_with("http://127.0.0.1:18789"));
        assert!(lines[2].is_empty());
        assert!(lines[3].contains("Run the API server"));
    }
}
