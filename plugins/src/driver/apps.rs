use autoprobe_core::api::Platform;

const IOS_ALIASES: &[(&str, &str)] = &[
    ("settings", "com.apple.Preferences"),
    ("preferences", "com.apple.Preferences"),
    ("safari", "com.apple.mobilesafari"),
    ("testflight", "com.apple.TestFlight"),
    ("camera", "com.apple.camera"),
    ("photos", "com.apple.mobileslideshow"),
];

const ANDROID_ALIASES: &[(&str, &str)] = &[
    ("settings", "com.android.settings"),
    ("chrome", "com.android.chrome"),
    ("camera", "com.android.camera2"),
    ("contacts", "com.android.contacts"),
];

/// Maps friendly app names such as `settings` to the platform's bundle id or
/// package. Unknown names are returned trimmed and unchanged.
pub fn resolve_app_id(raw: &str, platform: Platform) -> String {
    let key = raw.trim();
    let table = match platform {
        Platform::Ios => IOS_ALIASES,
        Platform::Android => ANDROID_ALIASES,
        Platform::Web => return key.to_string(),
    };
    table
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(key))
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_per_platform() {
        assert_eq!(resolve_app_id("Settings", Platform::Ios), "com.apple.Preferences");
        assert_eq!(resolve_app_id("settings", Platform::Android), "com.android.settings");
        assert_eq!(resolve_app_id(" com.example.app ", Platform::Android), "com.example.app");
    }
}
