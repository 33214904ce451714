use crate::rcc::HSI;

/// Accepted baud rates
///
/// The divisor of each rate is taken from a fixed table computed for a
/// 16 MHz peripheral clock with 16x oversampling.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B2400,
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
    B460800,
    B921600,
}

impl BaudRate {
    pub const ALL: [BaudRate; 10] = [
        BaudRate::B2400,
        BaudRate::B4800,
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
        BaudRate::B460800,
        BaudRate::B921600,
    ];

    /// Peripheral clock the BRR table is computed for
    pub const PCLK: u32 = HSI;

    pub const fn bps(self) -> u32 {
        match self {
            BaudRate::B2400 => 2_400,
            BaudRate::B4800 => 4_800,
            BaudRate::B9600 => 9_600,
            BaudRate::B19200 => 19_200,
            BaudRate::B38400 => 38_400,
            BaudRate::B57600 => 57_600,
            BaudRate::B115200 => 115_200,
            BaudRate::B230400 => 230_400,
            BaudRate::B460800 => 460_800,
            BaudRate::B921600 => 921_600,
        }
    }

    /// BRR value: 12-bit mantissa and 4-bit fraction of `PCLK / (16 * bps)`
    pub const fn brr(self) -> u32 {
        match self {
            BaudRate::B2400 => 0x1A0B,
            BaudRate::B4800 => 0x0D05,
            BaudRate::B9600 => 0x0683,
            BaudRate::B19200 => 0x0341,
            BaudRate::B38400 => 0x01A1,
            BaudRate::B57600 => 0x0116,
            BaudRate::B115200 => 0x008B,
            BaudRate::B230400 => 0x0045,
            BaudRate::B460800 => 0x0023,
            BaudRate::B921600 => 0x0011,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordLength {
    DataBits8,
    DataBits9,
}

/// Parity generation and checking. If odd or even parity is selected, the
/// parity bit takes the place of the most significant bit of a 9-bit frame.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// No parity bit will be added/checked.
    ParityNone,
    /// The MSB transmitted/received will be generated/checked to have a
    /// even number of bits set.
    ParityEven,
    /// The MSB transmitted/received will be generated/checked to have a
    /// odd number of bits set.
    ParityOdd,
}

/// Stop Bit configuration parameter for serial.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    #[doc = "1 stop bit"]
    STOP1 = 0b00,
    #[doc = "0.5 stop bits"]
    STOP0P5 = 0b01,
    #[doc = "2 stop bits"]
    STOP2 = 0b10,
    #[doc = "1.5 stop bits"]
    STOP1P5 = 0b11,
}

/// Enabled directions
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Disabled,
    Tx,
    Rx,
    RxTx,
}

impl Mode {
    pub const fn tx(self) -> bool {
        matches!(self, Mode::Tx | Mode::RxTx)
    }

    pub const fn rx(self) -> bool {
        matches!(self, Mode::Rx | Mode::RxTx)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub baudrate: BaudRate,
    pub wordlength: WordLength,
    pub parity: Parity,
    pub stopbits: StopBits,
    pub mode: Mode,
    /// Raise an interrupt for every received byte
    pub rx_interrupt: bool,
    /// Raise an interrupt once the transmit register is empty
    pub tx_interrupt: bool,
    /// NVIC priority of the USART vector
    pub priority: u8,
}

impl Config {
    pub fn baudrate(mut self, baudrate: BaudRate) -> Self {
        self.baudrate = baudrate;
        self
    }

    pub fn parity_none(mut self) -> Self {
        self.parity = Parity::ParityNone;
        self
    }

    pub fn parity_even(mut self) -> Self {
        self.parity = Parity::ParityEven;
        self
    }

    pub fn parity_odd(mut self) -> Self {
        self.parity = Parity::ParityOdd;
        self
    }

    pub fn wordlength_8bits(mut self) -> Self {
        self.wordlength = WordLength::DataBits8;
        self
    }

    pub fn wordlength_9bits(mut self) -> Self {
        self.wordlength = WordLength::DataBits9;
        self
    }

    pub fn stopbits(mut self, stopbits: StopBits) -> Self {
        self.stopbits = stopbits;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rx_interrupt(mut self, enable: bool) -> Self {
        self.rx_interrupt = enable;
        self
    }

    pub fn tx_interrupt(mut self, enable: bool) -> Self {
        self.tx_interrupt = enable;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Frame carries 9 bits: 9 data bits, or 8 data bits plus parity
    pub const fn nine_bit_frame(&self) -> bool {
        !matches!(self.parity, Parity::ParityNone)
            || matches!(self.wordlength, WordLength::DataBits9)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            baudrate: BaudRate::B115200,
            wordlength: WordLength::DataBits8,
            parity: Parity::ParityNone,
            stopbits: StopBits::STOP1,
            mode: Mode::RxTx,
            rx_interrupt: false,
            tx_interrupt: false,
            priority: 2,
        }
    }
}

impl From<BaudRate> for Config {
    fn from(baudrate: BaudRate) -> Config {
        Config {
            baudrate,
            ..Default::default()
        }
    }
}
