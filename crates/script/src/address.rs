use udplink::Address;

use crate::error::ScriptError;

const WILDCARD: &str = "*";

/// Parses `"host:port"`, splitting on the first colon.
///
/// `*` stands for any interface or any port and never reaches the resolver.
/// Other hosts are IPv4 literals or names resolved on the spot. The port is
/// read like C `atoi` and narrowed to 16 bits, so `"*:abc"` binds port 0.
pub fn parse_address(text: &str) -> Result<Address, ScriptError> {
    let Some((host, port)) = text.split_once(':') else {
        return Err(ScriptError::MalformedAddress(
            "Failed to parse address (missing port in address?)",
        ));
    };
    if host.is_empty() {
        return Err(ScriptError::MalformedAddress("Failed to parse address"));
    }
    if port.is_empty() {
        return Err(ScriptError::MalformedAddress("Missing port in address"));
    }

    let mut address = Address::any();
    if host != WILDCARD {
        address
            .set_host(host)
            .map_err(ScriptError::ResolutionFailure)?;
    }
    if port != WILDCARD {
        address.port = parse_port(port);
    }

    Ok(address)
}

fn parse_port(text: &str) -> u16 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i32, |acc, digit| {
            acc.wrapping_mul(10).wrapping_add((digit - b'0') as i32)
        });

    let value = if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    };
    value as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_literal_address() {
        let address = parse_address("127.0.0.1:8080").unwrap();
        assert_eq!(address.host, Ipv4Addr::LOCALHOST);
        assert_eq!(address.port, 8080);
    }

    #[test]
    fn test_wildcards() {
        let address = parse_address("*:*").unwrap();
        assert!(address.is_any_host());
        assert!(address.is_any_port());

        let address = parse_address("*:5000").unwrap();
        assert!(address.is_any_host());
        assert_eq!(address.port, 5000);
    }

    #[test]
    fn test_printed_form_parses_back() {
        for text in ["10.1.2.3:65535", "0.0.0.0:0", "192.168.0.1:1"] {
            let address = parse_address(text).unwrap();
            assert_eq!(address.to_string(), text);
            assert_eq!(parse_address(&address.to_string()).unwrap(), address);
        }
    }

    #[test]
    fn test_malformed_addresses() {
        let message = |text: &str| parse_address(text).unwrap_err().to_string();

        assert_eq!(
            message("127.0.0.1"),
            "Failed to parse address (missing port in address?)"
        );
        assert_eq!(message(":80"), "Failed to parse address");
        assert_eq!(message("127.0.0.1:"), "Missing port in address");
    }

    #[test]
    fn test_port_parse_is_permissive() {
        assert_eq!(parse_address("*:12ab").unwrap().port, 12);
        assert_eq!(parse_address("*:abc").unwrap().port, 0);
        assert_eq!(parse_address("*:70000").unwrap().port, 70000u32 as u16);
        assert_eq!(parse_address("*:-1").unwrap().port, u16::MAX);
        // only the first colon splits
        assert_eq!(parse_address("*:1:2").unwrap().port, 1);
    }

    #[test]
    fn test_unresolvable_host() {
        let err = parse_address("no-such-host.invalid:80").unwrap_err();
        assert!(matches!(err, ScriptError::ResolutionFailure(_)));
    }
}
