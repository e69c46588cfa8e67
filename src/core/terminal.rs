use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static HOOK: Emoji<'_, '_> = Emoji("🪝 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SLEEP: Emoji<'_, '_> = Emoji("💤 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_hook(description: &str, detail: &str) {
    println!("  {} {} {}", HOOK, style(description).bold(), style(detail).dim());
}

/// A titled block of commands and notes for help output.
pub struct GuideSection {
    title: String,
    lines: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines.push(format!(
            "  {:<12} {}",
            style(name).green().bold(),
            description
        ));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(format!("  {}", text));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(String::new());
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        for line in &self.lines {
            println!("{}", line);
        }
    }
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "     _                    ",
        "  __| | ___ _______ _ __  ",
        " / _` |/ _ \\_  / _ \\ '__| ",
        "| (_| | (_) / /  __/ |    ",
        " \\__,_|\\___/___\\___|_|    ",
    ];

    // Gradient: #6366f1 → #22d3ee, left to right
    let from: (u8, u8, u8) = (99, 102, 241);
    let to: (u8, u8, u8) = (34, 211, 238);
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(1).max(1) as u32;

    println!();
    for line in lines {
        for (x, ch) in line.chars().enumerate() {
            if ch == ' ' {
                print!(" ");
                continue;
            }
            let t = (x as u32 * 1000 / width).min(1000);
            let (r, g, b) = lerp_color(from, to, t);
            print!("\x1b[38;2;{};{};{}m{}", r, g, b, ch);
        }
        println!();
    }
    print!("\x1b[0m");

    println!(
        "{} {}\n",
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim(),
        style(env!("CARGO_PKG_DESCRIPTION")).cyan()
    );
}

fn lerp_color(a: (u8, u8, u8), b: (u8, u8, u8), t: u32) -> (u8, u8, u8) {
    let r = (a.0 as u32 * (1000 - t) + b.0 as u32 * t) / 1000;
    let g = (a.1 as u32 * (1000 - t) + b.1 as u32 * t) / 1000;
    let b_val = (a.2 as u32 * (1000 - t) + b.2 as u32 * t) / 1000;
    (r as u8, g as u8, b_val as u8)
}

pub fn print_goodbye() {
    println!("\n{} {}", SLEEP, style("dozer stopped. Sleep well.").bold().cyan());
}

#[cfg(test)]
mod tests {
    use super::lerp_color;

    #[test]
    fn lerp_hits_both_ends() {
        let a = (10, 20, 30);
        let b = (200, 100, 0);
        assert_eq!(lerp_color(a, b, 0), a);
        assert_eq!(lerp_color(a, b, 1000), b);
        assert_eq!(lerp_color(a, b, 500), (105, 60, 15));
    }
}
