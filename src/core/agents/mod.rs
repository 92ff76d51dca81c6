mod attire;
mod image;
mod router;
mod weather;

pub use attire::{AttireAgent, AttireOutcome};
pub use image::ImageAnalysisAgent;
pub use router::{Route, RouterAgent};
pub use weather::{LocationOutcome, WeatherAgent};

use chrono::{DateTime, Datelike, Duration, Local, TimeZone};

pub const MODEL: &str = "gemini-2.5-flash";

const ROUTER_PROMPT: &str = include_str!("prompts/router.txt");
const WEATHER_PROMPT: &str = include_str!("prompts/weather.txt");
const ATTIRE_PROMPT: &str = include_str!("prompts/attire.txt");
const IMAGE_PROMPT: &str = include_str!("prompts/image_analysis.txt");

const TOOL_COST: &str = "You must consider the cost of each tool use. Repetative tool use should be avoided.";

/// Full system instruction for an agent: the date context, the tool-cost
/// reminder, then the agent's own prompt.
fn system_instruction(prompt: &str) -> String {
    format!("{}\n{}\n{}", date_context(Local::now()), TOOL_COST, prompt)
}

fn format_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%A, %B %-d, %Y").to_string()
}

/// Sunday-to-Saturday week containing `date`, shifted by `offset` weeks.
fn week_bounds<Tz: TimeZone>(date: &DateTime<Tz>, offset: i64) -> (DateTime<Tz>, DateTime<Tz>) {
    let shifted = date.clone() + Duration::weeks(offset);
    let back = shifted.weekday().num_days_from_sunday() as i64;
    let start = shifted - Duration::days(back);
    let end = start.clone() + Duration::days(6);
    (start, end)
}

/// Relative-date interpretation rules anchored to the current moment, so the
/// model resolves "tomorrow" and "next week" consistently.
fn date_context<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let yesterday = now.clone() - Duration::days(1);
    let tomorrow = now.clone() + Duration::days(1);
    let (this_start, this_end) = week_bounds(&now, 0);
    let (last_start, last_end) = week_bounds(&now, -1);
    let (next_start, next_end) = week_bounds(&now, 1);
    let next_day = tomorrow.format("%A");

    format!(
        "\n**System Context:**\n\
         * **Today's Date:** {today}\n\
         * **Current Time:** {time}\n\
         \n\
         **Relative Date Interpretation Rules:**\n\
         1.  \"Today\" refers to {today}.\n\
         2.  \"Yesterday\" refers to {yesterday}.\n\
         3.  \"Tomorrow\" refers to {tomorrow}.\n\
         4.  \"This week\" refers to the period from {this_start} to {this_end}.\n\
         5.  \"Last week\" refers to the period from {last_start} to {last_end}.\n\
         6.  \"Next week\" refers to the period from {next_start} to {next_end}.\n\
         7.  \"Next [Day]\" (e.g., \"next {next_day}\") refers to the first instance of that day after this week.\n\
         8.  \"In [N] days\" (e.g., \"in 3 days\") refers to the date exactly N days from today.\n",
        today = format_date(&now),
        time = now.format("%I:%M %p %z"),
        yesterday = format_date(&yesterday),
        tomorrow = format_date(&tomorrow),
        this_start = format_date(&this_start),
        this_end = format_date(&this_end),
        last_start = format_date(&last_start),
        last_end = format_date(&last_end),
        next_start = format_date(&next_start),
        next_end = format_date(&next_end),
    )
}
