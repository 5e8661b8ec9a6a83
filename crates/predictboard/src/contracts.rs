// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Smart contract interfaces read by the indexer.

alloy::sol! {
    #![sol(rpc, all_derives)]

    interface IPredictionMarket {
        event SharesPurchased(uint256 indexed marketId, address indexed buyer, bool isOptionA, uint256 amount);
        event Claimed(uint256 indexed marketId, address indexed user, uint256 amount);

        function bettingToken() external view returns (address);
        function getMarketInfoBatch(uint256[] calldata marketIds)
            external
            view
            returns (string[] memory questions, string[] memory optionAs, string[] memory optionBs);
    }

    interface IERC20Metadata {
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
    }
}
