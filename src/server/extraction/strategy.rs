/// per-hop signals the escalation policy decides on. pure data, no I/O, so
/// `choose_strategy` is unit-testable without ever touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct HopSignals {
    pub soft_timeout_elapsed: bool,
    pub challenge_status: bool,
    pub body_len: usize,
    pub cloudflare_indicator: bool,
}

/// `Strategy` is a small sum type, not a trait-object hierarchy - the hop parsers
/// underneath it are pure functions over HTML text regardless of which strategy
/// fetched that text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PureFetch,
    Browser,
}

const CLOUDFLARE_BODY_FLOOR: usize = 3_000;

/// no match at hop N after soft timeout, a challenge status, or a short body with
/// cloudflare indicators escalates from pure-fetch to a real browser.
pub fn choose_strategy(previous: Strategy, signals: HopSignals) -> Strategy {
    if previous == Strategy::Browser {
        return Strategy::Browser;
    }

    let should_escalate = signals.soft_timeout_elapsed
        || signals.challenge_status
        || (signals.body_len < CLOUDFLARE_BODY_FLOOR && signals.cloudflare_indicator);

    if should_escalate {
        Strategy::Browser
    } else {
        Strategy::PureFetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_on_pure_fetch_when_nothing_trips() {
        let signals = HopSignals {
            body_len: 50_000,
            ..Default::default()
        };
        assert_eq!(choose_strategy(Strategy::PureFetch, signals), Strategy::PureFetch);
    }

    #[test]
    fn escalates_on_challenge_status() {
        let signals = HopSignals {
            challenge_status: true,
            ..Default::default()
        };
        assert_eq!(choose_strategy(Strategy::PureFetch, signals), Strategy::Browser);
    }

    #[test]
    fn escalates_on_short_body_with_cloudflare_indicator() {
        let signals = HopSignals {
            body_len: 1_200,
            cloudflare_indicator: true,
            ..Default::default()
        };
        assert_eq!(choose_strategy(Strategy::PureFetch, signals), Strategy::Browser);
    }

    #[test]
    fn short_body_without_cloudflare_indicator_does_not_escalate() {
        let signals = HopSignals {
            body_len: 1_200,
            cloudflare_indicator: false,
            ..Default::default()
        };
        assert_eq!(choose_strategy(Strategy::PureFetch, signals), Strategy::PureFetch);
    }

    #[test]
    fn never_de_escalates_from_browser() {
        let signals = HopSignals::default();
        assert_eq!(choose_strategy(Strategy::Browser, signals), Strategy::Browser);
    }
}
