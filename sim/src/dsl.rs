/// This macro helps defining a set of hardware units living inside a core.
///
/// Every unit has input signals, output signals and some internal state.
/// During a cycle the owner of the units computes the inputs of a unit from
/// the outputs of the others (and from its own state) and then triggers it.
/// Triggering a unit runs its body once: it reads the inputs, may update its
/// internal state and overwrites its outputs. Outputs keep their values until
/// the next trigger, so they double as the registers visible in the next
/// cycle.
///
/// ```ignore
/// define_units! {
///     Counter counter {
///         .input(enable: bool)
///         .output(value: u8)
///         count: u8
///     } {
///         if enable { *count += 1 }
///         *value = *count;
///     }
/// }
/// ```
///
/// Inside the body, inputs are bound by value, outputs and state by mutable
/// reference.
#[macro_export]
macro_rules! define_units {
    ($(
        $(#[$att:meta])*
        $unit_name:ident $unit_short_name:ident {
            $(.input( $($(#[$input_att:meta])* $iname:ident : $itype:ty),* $(,)? ))?
            $(.output( $($(#[$output_att:meta])* $oname:ident : $otype:ty),* $(,)? ))?
            $($sname:ident : $stype:ty),* $(,)?
        } $body:block
    )*) => {
        /// Input signals of units
        pub mod unit_in {
            #![allow(unused_imports)]
            use super::*;
            $(#[derive(Default, Debug, Clone)]
            pub struct $unit_name {
                $($($(#[$input_att])* pub $iname: $itype, )*)?
            })*
        }
        /// Output signals of units
        pub mod unit_out {
            #![allow(unused_imports)]
            use super::*;
            $(#[derive(Default, Debug, Clone)]
            pub struct $unit_name {
                $($($(#[$output_att])* pub $oname: $otype, )*)?
            })*
        }

        $(
        $(#[$att])*
        #[derive(Default, Debug, Clone)]
        pub struct $unit_name {
            $(pub $sname: $stype, )*
        }

        impl $unit_name {
            #[allow(unused)]
            pub fn trigger(
                &mut self,
                inputs: unit_in::$unit_name,
                outputs: &mut unit_out::$unit_name,
            ) {
                let Self { $( $sname, )* } = self;
                let unit_in::$unit_name { $($( $iname, )*)? } = inputs;
                let unit_out::$unit_name { $($( $oname, )*)? } = outputs;
                $body
            }
        }
        )*

        /// All units of this group.
        #[derive(Default, Debug, Clone)]
        pub struct Units {
            $( pub $unit_short_name: $unit_name, )*
        }

        /// Latest outputs of every unit in this group.
        #[derive(Default, Debug, Clone)]
        pub struct UnitOutputSignal {
            $( pub $unit_short_name: unit_out::$unit_name, )*
        }
    };
}

/// Whether `sig` matches any of `choice`.
pub(crate) fn mtc<T: Eq>(sig: T, choice: impl AsRef<[T]>) -> bool {
    choice.as_ref().iter().any(|c| *c == sig)
}
