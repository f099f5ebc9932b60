use std::cell::Cell;

use tracing::warn;

use crate::memory::Encoding;

/// Selects the `.ob` word encoding, `base4` or `decimal`.
pub const ENCODING_VAR: &str = "PASM_ENCODING";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Env {
    encoding: Encoding,
}

impl Env {
    /// Unset or empty values keep the default, bad ones are warned about.
    fn from_value(encoding: Option<&str>) -> Env {
        let encoding = match encoding.filter(|value| !value.is_empty()) {
            Some(value) => value.parse().unwrap_or_else(|err| {
                warn!("{ENCODING_VAR}: {err}, using {}", Encoding::default());
                Encoding::default()
            }),
            None => Encoding::default(),
        };
        Env { encoding }
    }
}

thread_local! {
    /// Written once by `init`
    static ENV: Cell<Option<Env>> = const { Cell::new(None) };
}

pub fn init() {
    let value = std::env::var(ENCODING_VAR).ok();
    store(Env::from_value(value.as_deref()));
}

pub fn encoding() -> Encoding {
    load().encoding
}

fn store(value: Env) {
    let previous = ENV.replace(Some(value));
    assert!(
        previous.is_none(),
        "tried to initialize environment state multiple times"
    );
}

fn load() -> Env {
    ENV.get()
        .unwrap_or_else(|| panic!("tried to access environment state before initialization"))
}
