//! Fuzz target: `PortalForm::parse`
//!
//! Feeds arbitrary form bodies into the setup-portal parser.  Anything it
//! accepts must satisfy the credential limits enforced on submission.
//!
//! cargo fuzz run fuzz_portal_form

#![no_main]

use co2ampel::adapters::wifi::PortalForm;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(form) = PortalForm::parse(body) {
        if let Some(ssid) = &form.ssid {
            assert!(!ssid.is_empty() && ssid.len() <= 32);
        }
        let pass = form.password.len();
        assert!(pass == 0 || (8..=64).contains(&pass));
    }
});
