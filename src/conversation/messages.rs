//! User-facing reply texts.

use crate::conversation::state::FunnelStep;

pub const WELCOME: &str =
    "Hi! I'm the birthday bot. I'll remind you about your colleagues' birthdays.";
pub const ASK_EMAIL: &str = "Please enter your work email so I can find you in the directory.";
pub const CHECK_EMAIL: &str =
    "Check your email and follow the activation link, then write me again.";
pub const INVALID_EMAIL: &str = "That doesn't look like an email address, try again.";
pub const EMPLOYEE_NOT_FOUND: &str = "I couldn't find you in the organization, try again.";
pub const ALREADY_REGISTERED: &str = "This email is already registered, try another one.";
pub const REGISTRATION_FAILED: &str =
    "Something went wrong while processing your data, try again later.";

pub const MENU: &str = "What would you like to do?\n1. Find a colleague\n2. My subscriptions";
/// Keyboard buttons for the main menu.
pub const MENU_OPTIONS: [&str; 2] = ["1", "2"];
pub const NOT_IMPLEMENTED: &str = "This section is still under development.";
pub const UNKNOWN_COMMAND: &str = "Unknown command 0_o";

pub const NO_SUCH_OPTION: &str = "There is no such option, pick one from the list.";
pub const DIRECTORY_EMPTY: &str = "The directory is empty for now.";
pub const INPUT_ERROR: &str = "I couldn't read a person id, pick someone from the list.";
pub const SERVER_ERROR: &str = "Server error, try again later.";
pub const SUBSCRIBED: &str = "Subscribed! I'll remind you shortly before the birthday.";

/// Prompt shown when the funnel asks for `step`.
pub fn prompt_for(step: FunnelStep) -> &'static str {
    match step {
        FunnelStep::Organization => "Choose an organization:",
        FunnelStep::City => "Choose a city:",
        FunnelStep::Office => "Choose an office:",
        FunnelStep::Department => "Choose a department:",
        FunnelStep::Person => "Choose a person or enter their id:",
    }
}
