//! Register map for the STM32F401/F411 peripherals driven by this crate
//!
//! Base addresses come from the device crate. Register offsets and bit
//! positions follow RM0368 and are checked against the device crate's
//! register blocks in the tests. Only the registers the drivers touch are
//! listed.

#![allow(missing_docs)]

/// Start address of a device crate register block
#[inline(always)]
pub fn address_of<T>(block: *const T) -> u32 {
    block as usize as u32
}

pub mod rcc {
    pub fn base() -> u32 {
        super::address_of(crate::pac::RCC::PTR)
    }

    pub const AHB1RSTR: u32 = 0x10;
    pub const APB1RSTR: u32 = 0x20;
    pub const APB2RSTR: u32 = 0x24;
    pub const AHB1ENR: u32 = 0x30;
    pub const APB1ENR: u32 = 0x40;
    pub const APB2ENR: u32 = 0x44;
}

pub mod gpio {
    pub const MODER: u32 = 0x00;
    pub const OTYPER: u32 = 0x04;
    pub const OSPEEDR: u32 = 0x08;
    pub const PUPDR: u32 = 0x0C;
    pub const IDR: u32 = 0x10;
    pub const ODR: u32 = 0x14;
    pub const BSRR: u32 = 0x18;
    pub const AFRL: u32 = 0x20;
    pub const AFRH: u32 = 0x24;
}

pub mod syscfg {
    pub fn base() -> u32 {
        super::address_of(crate::pac::SYSCFG::PTR)
    }

    /// EXTICR1..EXTICR4 are consecutive words starting here
    pub const EXTICR1: u32 = 0x08;
}

pub mod exti {
    pub fn base() -> u32 {
        super::address_of(crate::pac::EXTI::PTR)
    }

    pub const IMR: u32 = 0x00;
    pub const EMR: u32 = 0x04;
    pub const RTSR: u32 = 0x08;
    pub const FTSR: u32 = 0x0C;
    pub const SWIER: u32 = 0x10;
    pub const PR: u32 = 0x14;
}

pub mod tim {
    pub const CR1: u32 = 0x00;
    pub const DIER: u32 = 0x0C;
    pub const SR: u32 = 0x10;
    pub const EGR: u32 = 0x14;
    pub const CCMR1: u32 = 0x18;
    pub const CCMR2: u32 = 0x1C;
    pub const CCER: u32 = 0x20;
    pub const CNT: u32 = 0x24;
    pub const PSC: u32 = 0x28;
    pub const ARR: u32 = 0x2C;
    pub const CCR1: u32 = 0x34;

    pub const CR1_CEN: u8 = 0;
    pub const CR1_URS: u8 = 2;
    pub const CR1_DIR: u8 = 4;
    pub const CR1_ARPE: u8 = 7;

    pub const DIER_UIE: u8 = 0;
    pub const SR_UIF: u8 = 0;
    pub const EGR_UG: u8 = 0;

    /// Output compare field positions inside the low half of a CCMR word.
    /// The second channel of a CCMR register sits 8 bits higher.
    pub const CCMR_OCFE: u8 = 2;
    pub const CCMR_OCPE: u8 = 3;
    pub const CCMR_OCM: u8 = 4;
}

pub mod usart {
    pub const SR: u32 = 0x00;
    pub const DR: u32 = 0x04;
    pub const BRR: u32 = 0x08;
    pub const CR1: u32 = 0x0C;
    pub const CR2: u32 = 0x10;
    pub const CR3: u32 = 0x14;

    pub const SR_PE: u8 = 0;
    pub const SR_FE: u8 = 1;
    pub const SR_NF: u8 = 2;
    pub const SR_ORE: u8 = 3;
    pub const SR_RXNE: u8 = 5;
    pub const SR_TC: u8 = 6;
    pub const SR_TXE: u8 = 7;

    pub const CR1_RE: u8 = 2;
    pub const CR1_TE: u8 = 3;
    pub const CR1_RXNEIE: u8 = 5;
    pub const CR1_TXEIE: u8 = 7;
    pub const CR1_PEIE: u8 = 8;
    pub const CR1_PS: u8 = 9;
    pub const CR1_PCE: u8 = 10;
    pub const CR1_M: u8 = 12;
    pub const CR1_UE: u8 = 13;

    pub const CR2_STOP: u8 = 12;
}

pub mod adc {
    pub const SR: u32 = 0x00;
    pub const CR1: u32 = 0x04;
    pub const CR2: u32 = 0x08;
    pub const SMPR1: u32 = 0x0C;
    pub const SMPR2: u32 = 0x10;
    pub const SQR1: u32 = 0x2C;
    pub const SQR3: u32 = 0x34;
    pub const DR: u32 = 0x4C;

    pub const SR_EOC: u8 = 1;
    pub const SR_OVR: u8 = 5;

    pub const CR1_EOCIE: u8 = 5;
    pub const CR1_SCAN: u8 = 8;
    pub const CR1_RES: u8 = 24;
    pub const CR1_OVRIE: u8 = 26;

    pub const CR2_ADON: u8 = 0;
    pub const CR2_CONT: u8 = 1;
    pub const CR2_ALIGN: u8 = 11;
    pub const CR2_SWSTART: u8 = 30;

    pub const SQR1_L: u8 = 20;
}

pub mod i2c {
    pub const CR1: u32 = 0x00;
    pub const CR2: u32 = 0x04;
    pub const OAR1: u32 = 0x08;
    pub const DR: u32 = 0x10;
    pub const SR1: u32 = 0x14;
    pub const SR2: u32 = 0x18;
    pub const CCR: u32 = 0x1C;
    pub const TRISE: u32 = 0x20;

    pub const CR1_PE: u8 = 0;
    pub const CR1_START: u8 = 8;
    pub const CR1_STOP: u8 = 9;
    pub const CR1_ACK: u8 = 10;
    pub const CR1_POS: u8 = 11;
    pub const CR1_SWRST: u8 = 15;

    pub const SR1_SB: u8 = 0;
    pub const SR1_ADDR: u8 = 1;
    pub const SR1_BTF: u8 = 2;
    pub const SR1_RXNE: u8 = 6;
    pub const SR1_TXE: u8 = 7;
    pub const SR1_BERR: u8 = 8;
    pub const SR1_ARLO: u8 = 9;
    pub const SR1_AF: u8 = 10;
    pub const SR1_OVR: u8 = 11;

    pub const SR2_MSL: u8 = 0;
    pub const SR2_BUSY: u8 = 1;
    pub const SR2_TRA: u8 = 2;

    pub const CCR_MASK: u32 = 0xFFF;
    pub const CCR_DUTY: u8 = 14;
    pub const CCR_FS: u8 = 15;
}
