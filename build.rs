// ESP-IDF environment forwarding.
//
// Host builds (tests, desktop simulation) have no ESP-IDF environment to
// forward, so only espidf targets call into embuild.

fn main() {
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
