//! WebDriver-protocol driver shared by Appium (Android, iOS) and browser targets.

pub mod apps;
pub mod hierarchy;
pub mod url;
pub mod webdriver;

pub use webdriver::{WebDriverClient, WebDriverSession};
