use super::{OptNumber, OptValue, OptionSet};
use crate::code::{ABORT, CSM, PING, PONG, RELEASE};
use crate::Code;

/// Options of 7.01 Capabilities and Settings Messages
pub mod csm {
  use crate::OptNumber;

  /// The largest message this peer is willing to receive (uint)
  pub const MAX_MESSAGE_SIZE: OptNumber = OptNumber(2);

  /// Present (with an empty value) when this peer supports block-wise transfers
  pub const BLOCK_WISE_TRANSFER: OptNumber = OptNumber(4);
}

/// Options of 7.02 Ping and 7.03 Pong
pub mod ping {
  use crate::OptNumber;

  /// Ask the peer to delay its Pong until all outstanding responses have been sent
  pub const CUSTODY: OptNumber = OptNumber(2);
}

/// Options of 7.04 Release
pub mod release {
  use crate::OptNumber;

  /// Where the peer may reconnect; repeatable
  pub const ALTERNATIVE_ADDRESS: OptNumber = OptNumber(2);

  /// Seconds to wait before reconnecting (uint)
  pub const HOLD_OFF: OptNumber = OptNumber(4);
}

/// Options of 7.05 Abort
pub mod abort {
  use crate::OptNumber;

  /// The CSM option that caused the abort (uint)
  pub const BAD_CSM_OPTION: OptNumber = OptNumber(2);
}

/// A signaling message (CoAP over reliable transports, code class 7)
///
/// Signaling codes reuse small option numbers with their own meaning:
/// in a CSM, option 4 is Block-Wise-Transfer and not ETag. Which
/// meaning applies is decided by the message code.
///
/// ```
/// use croak_msg::{Code, Signaling};
///
/// let csm = Signaling::Csm { max_message_size: Some(8192),
///                            block_wise: true };
/// let opts = csm.options();
///
/// assert_eq!(csm.code(), croak_msg::code::CSM);
/// assert_eq!(Signaling::parse(csm.code(), &opts), Some(csm));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signaling {
  /// 7.01 Capabilities and Settings Message
  Csm {
    /// Max-Message-Size, if advertised
    max_message_size: Option<u32>,
    /// Block-Wise-Transfer
    block_wise: bool,
  },
  /// 7.02 Ping
  Ping {
    /// Custody
    custody: bool,
  },
  /// 7.03 Pong
  Pong {
    /// Custody
    custody: bool,
  },
  /// 7.04 Release
  Release {
    /// Alternative-Address values
    alternative_addresses: Vec<String>,
    /// Hold-Off in seconds
    hold_off: Option<u32>,
  },
  /// 7.05 Abort
  Abort {
    /// Bad-CSM-Option
    bad_csm_option: Option<u32>,
  },
}

impl Signaling {
  /// Interpret the options of a message with a signaling code.
  ///
  /// Yields `None` for codes outside 7.01..=7.05.
  pub fn parse(code: Code, opts: &OptionSet) -> Option<Self> {
    let uint = |n: OptNumber| opts.first(n).and_then(OptValue::as_uint);

    match code {
      | CSM => Some(Self::Csm { max_message_size: uint(csm::MAX_MESSAGE_SIZE),
                                block_wise: opts.contains(csm::BLOCK_WISE_TRANSFER) }),
      | PING => Some(Self::Ping { custody: opts.contains(ping::CUSTODY) }),
      | PONG => Some(Self::Pong { custody: opts.contains(ping::CUSTODY) }),
      | RELEASE => {
        let alternative_addresses = opts.get(release::ALTERNATIVE_ADDRESS)
                                        .unwrap_or_default()
                                        .iter()
                                        .filter_map(|v| v.as_str().map(String::from))
                                        .collect();
        Some(Self::Release { alternative_addresses,
                             hold_off: uint(release::HOLD_OFF) })
      },
      | ABORT => Some(Self::Abort { bad_csm_option: uint(abort::BAD_CSM_OPTION) }),
      | _ => None,
    }
  }

  /// The message code for this signal
  pub fn code(&self) -> Code {
    match self {
      | Self::Csm { .. } => CSM,
      | Self::Ping { .. } => PING,
      | Self::Pong { .. } => PONG,
      | Self::Release { .. } => RELEASE,
      | Self::Abort { .. } => ABORT,
    }
  }

  /// The options that carry this signal
  pub fn options(&self) -> OptionSet {
    let flag = |set: OptionSet, n: OptNumber, on: bool| match on {
      | true => set.set(n, OptValue::default()),
      | false => set,
    };
    let uint = |set: OptionSet, n: OptNumber, v: Option<u32>| match v {
      | Some(v) => set.set(n, OptValue::uint(v)),
      | None => set,
    };

    match self {
      | Self::Csm { max_message_size,
                    block_wise, } => {
        let set = uint(OptionSet::new(), csm::MAX_MESSAGE_SIZE, *max_message_size);
        flag(set, csm::BLOCK_WISE_TRANSFER, *block_wise)
      },
      | Self::Ping { custody } | Self::Pong { custody } => {
        flag(OptionSet::new(), ping::CUSTODY, *custody)
      },
      | Self::Release { alternative_addresses,
                        hold_off, } => {
        let set = OptionSet::new().set_all(release::ALTERNATIVE_ADDRESS,
                                           alternative_addresses.iter().map(|a| a.as_str()));
        uint(set, release::HOLD_OFF, *hold_off)
      },
      | Self::Abort { bad_csm_option } => {
        uint(OptionSet::new(), abort::BAD_CSM_OPTION, *bad_csm_option)
      },
    }
  }
}
