use std::fmt::Display;
use std::str::FromStr;

/// 24-bit RGB colour. Immutable once constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Colour {
    r: u8,
    g: u8,
    b: u8,
}

impl Colour {
    pub const BLACK: Colour = Colour::new(0, 0, 0);
    pub const WHITE: Colour = Colour::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels in wire order (blue, green, red)
    #[inline(always)]
    pub const fn to_bgr(self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }

    #[inline(always)]
    pub const fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Colour {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl Display for Colour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Colour {
    type Err = String;
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        // parse hex string into rgb
        let mut hex = code.trim_start_matches('#').to_string();
        match hex.len() {
            3 => {
                // Extend 3 character hex colors
                hex = hex.chars().flat_map(|a| [a, a]).collect();
            },
            6 => {},
            l => return Err(format!("Invalid hex length for {code}: {l}")),
        }
        // from_str_radix would also take a sign
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("Invalid hex color: {code}"));
        }
        if let Ok(channel_bytes) = u32::from_str_radix(&hex, 16) {
            let r = ((channel_bytes >> 16) & 0xFF) as u8;
            let g = ((channel_bytes >> 8) & 0xFF) as u8;
            let b = (channel_bytes & 0xFF) as u8;
            Ok(Self::new(r, g, b))
        } else {
            Err(format!("Invalid hex color: {code}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex() {
        assert_eq!("#ff8000".parse::<Colour>(), Ok(Colour::new(255, 128, 0)));
        assert_eq!("0a0b0c".parse::<Colour>(), Ok(Colour::new(10, 11, 12)));
        // short form doubles each digit
        assert_eq!("#f0a".parse::<Colour>(), Ok(Colour::new(0xff, 0x00, 0xaa)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("#12345".parse::<Colour>().is_err());
        assert!("#gggggg".parse::<Colour>().is_err());
        assert!("#+12345".parse::<Colour>().is_err());
        assert!("+12".parse::<Colour>().is_err());
    }

    #[test]
    fn display_roundtrips() {
        let colour = Colour::new(1, 2, 254);
        assert_eq!(colour.to_string(), "#0102fe");
        assert_eq!(colour.to_string().parse::<Colour>(), Ok(colour));
    }

    #[test]
    fn wire_order_is_bgr() {
        assert_eq!(Colour::new(1, 2, 3).to_bgr(), [3, 2, 1]);
    }
}
